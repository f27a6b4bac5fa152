//! End-to-end tests over a realistic schema: the manifest of a backup
//! archive, with nested directories, per-entry metadata, macro variables,
//! and a sealed wrapper record around the whole thing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokenstream::{
    from_slice, read_into_slice, streamable_enum, to_vec, to_vec_with_trim, token_map, Binary,
    Generic, MemoryWriter, Reader,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Platform {
    #[default]
    Any = 0,
    Windows = 1,
    Mac = 2,
    Linux = 3,
}

streamable_enum!(Platform as u8 { Any, Windows, Mac, Linux });

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Codec {
    #[default]
    Default = 0,
    None = 1,
    Deflate = 2,
    Zstd = 3,
    Lzma = 4,
}

streamable_enum!(Codec as u8 { Default, None, Deflate, Zstd, Lzma });

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Digest {
    #[default]
    Sha1 = 0,
    Sha256 = 1,
}

streamable_enum!(Digest as u8 { Sha1, Sha256 });

#[derive(Debug, Default, Clone, PartialEq)]
struct EntryData {
    name: String,
    priority: i32,
    timestamp: u32,
    packed_size: u32,
    raw_size: u32,
    checksum: u32,
    codec: Codec,
    condition: String,
    languages: BTreeSet<String>,
    platforms: Vec<Platform>,
    executable: bool,
    link: String,
    uri: String,
    offset: u64,
}

token_map!(EntryData {
    0 => name,
    1 => priority,
    2 => timestamp,
    3 => packed_size,
    4 => raw_size,
    5 => checksum,
    6 => codec = Codec::Default,
    7 => condition,
    8 => languages,
    9 => platforms,
    10 => executable,
    11 => link,
    12 => uri,
    13 => offset,
});

#[derive(Debug, Default, Clone, PartialEq)]
struct DirectoryData {
    path: String,
    max_priority: i32,
    platforms: Vec<Platform>,
    condition: String,
    dirs: Vec<DirectoryData>,
    entries: Vec<EntryData>,
}

token_map!(DirectoryData {
    1 => path,
    2 => max_priority,
    3 => platforms,
    4 => condition,
    5 => dirs,
    6 => entries,
});

#[derive(Debug, Default, Clone, PartialEq)]
struct LimitsData {
    min_memory: u32,
    min_os_version: f32,
}

token_map!(LimitsData {
    0 => min_memory,
    1 => min_os_version,
});

#[derive(Debug, Default, Clone, PartialEq)]
struct MirrorData {
    uri: String,
    launch_params: String,
    child_path: String,
    platforms: Vec<Platform>,
    vars: HashMap<String, String>,
    dirs: Vec<DirectoryData>,
}

token_map!(MirrorData {
    0 => uri,
    1 => launch_params,
    2 => child_path,
    3 => platforms,
    4 => vars,
    5 => dirs,
});

#[derive(Debug, Clone, PartialEq)]
struct ArchiveData {
    title: String,
    builder_version: u16,
    created: u32,
    notes: String,
    reserve_mb: i32,
    total_size: u32,
    entry_count: u32,
    launcher: String,
    work_dir: String,
    launch_params: String,
    child_path: String,
    is_wrapper: bool,
    languages: Vec<String>,
    codec: Codec,
    vars: BTreeMap<String, String>,
    limits: Vec<LimitsData>,
    mirrors: Vec<MirrorData>,
    dirs: Vec<DirectoryData>,
}

impl Default for ArchiveData {
    fn default() -> Self {
        ArchiveData {
            title: String::new(),
            builder_version: 0,
            created: 0,
            notes: String::new(),
            reserve_mb: 0,
            total_size: 0,
            entry_count: 0,
            launcher: String::new(),
            work_dir: ".".to_string(),
            launch_params: String::new(),
            child_path: String::new(),
            is_wrapper: false,
            languages: Vec::new(),
            codec: Codec::Lzma,
            vars: BTreeMap::new(),
            limits: Vec::new(),
            mirrors: Vec::new(),
            dirs: Vec::new(),
        }
    }
}

token_map!(ArchiveData {
    0 => title,
    1 => builder_version,
    2 => created,
    3 => notes,
    4 => reserve_mb,
    5 => total_size,
    6 => entry_count,
    7 => launcher,
    8 => work_dir = ".",
    9 => launch_params,
    10 => child_path,
    11 => is_wrapper,
    12 => languages,
    13 => codec = Codec::Lzma,
    14 => vars,
    15 => limits,
    16 => mirrors,
    17 => dirs,
});

#[derive(Debug, Default, Clone, PartialEq)]
struct SealedArchiveData {
    archive: ArchiveData,
    signature: Binary,
    digest: Digest,
}

token_map!(SealedArchiveData {
    nested 0 => archive: ArchiveData,
    1 => signature,
    2 => digest,
});

fn make_archive() -> ArchiveData {
    let mut archive = ArchiveData {
        title: "Quake".to_string(),
        builder_version: 1,
        created: 1000,
        notes: "The best game ever!".to_string(),
        reserve_mb: -0x88,
        entry_count: 0xc0,
        ..ArchiveData::default()
    };

    archive.vars.insert("root".to_string(), "c:/example/game".to_string());
    archive.vars.insert("cert".to_string(), "my.cert".to_string());
    archive.vars.insert("repeat".to_string(), String::new());
    archive.vars.insert(String::new(), String::new());

    archive.languages = vec!["en".to_string(), String::new(), "de".to_string()];

    archive.limits.push(LimitsData {
        min_memory: 1000,
        min_os_version: 10.1,
    });

    let mut dir = DirectoryData {
        path: "bin".to_string(),
        ..DirectoryData::default()
    };

    let mut entry = EntryData {
        name: "Quake.exe".to_string(),
        timestamp: 0x1234_5678,
        packed_size: 10_000,
        raw_size: 100_000,
        checksum: 0x8765_4321,
        executable: true,
        ..EntryData::default()
    };
    entry.languages.insert("de".to_string());
    entry.languages.insert("en".to_string());
    entry.platforms.push(Platform::Windows);
    dir.entries.push(entry);

    dir.entries.push(EntryData {
        name: "Quake2.exe".to_string(),
        timestamp: 0x1234_5679,
        packed_size: 100_000,
        raw_size: 1_000_000,
        checksum: 0x8765_4343,
        platforms: vec![Platform::Windows, Platform::Mac],
        executable: true,
        ..EntryData::default()
    });

    archive.dirs.push(dir);
    archive
}

fn make_sealed() -> SealedArchiveData {
    SealedArchiveData {
        archive: make_archive(),
        signature: Binary::from(vec![0xde, 0xad, 0xbe, 0xef]),
        digest: Digest::Sha256,
    }
}

/// The same sealed archive assembled at runtime. Every token and value
/// matches [`make_sealed`], so the wire bytes must too.
fn make_sealed_generic() -> Generic {
    let mut archive = Generic::new();
    archive
        .add_str(0u64, "Quake")
        .add(1u64, 1u16)
        .add(2u64, 1000u32)
        .add_str(3u64, "The best game ever!")
        .add(4u64, -0x88i32)
        .add(6u64, 0xc0u32)
        .add_with_default(13u64, Codec::Lzma, Codec::Lzma);

    // vars, in the key order the sorted map writes them.
    let mut vars = Vec::new();
    vars.push(Generic::new()); // ("", "") trims both fields; only the stub remains
    let mut var = Generic::new();
    var.add_str(0u64, "cert").add_str(1u64, "my.cert");
    vars.push(var);
    let mut var = Generic::new();
    var.add_str(0u64, "repeat");
    vars.push(var);
    let mut var = Generic::new();
    var.add_str(0u64, "root").add_str(1u64, "c:/example/game");
    vars.push(var);
    archive.add(14u64, vars);

    archive.add(
        12u64,
        vec!["en".to_string(), String::new(), "de".to_string()],
    );

    // A single record where the struct holds a one-element vector; the two
    // degenerate to the same single chunk.
    let mut limits = Generic::new();
    limits.add(0u64, 1000u32).add(1u64, 10.1f32);
    archive.add(15u64, limits);

    let mut entry1 = Generic::new();
    entry1
        .add_str(0u64, "Quake.exe")
        .add(2u64, 0x1234_5678u32)
        .add(3u64, 10_000u32)
        .add(4u64, 100_000u32)
        .add(5u64, 0x8765_4321u32)
        .add(8u64, vec!["de".to_string(), "en".to_string()])
        .add(9u64, vec![Platform::Windows])
        .add(10u64, true);

    let mut entry2 = Generic::new();
    entry2
        .add_str(0u64, "Quake2.exe")
        .add(2u64, 0x1234_5679u32)
        .add(3u64, 100_000u32)
        .add(4u64, 1_000_000u32)
        .add(5u64, 0x8765_4343u32)
        .add(9u64, vec![Platform::Windows, Platform::Mac])
        .add(10u64, true);

    let mut dir = Generic::new();
    dir.add_str(1u64, "bin").add(6u64, vec![entry1, entry2]);
    archive.add(17u64, vec![dir]);

    let mut sealed = Generic::new();
    sealed
        .add(0u64, archive)
        .add(1u64, Binary::from(vec![0xde, 0xad, 0xbe, 0xef]))
        .add(2u64, Digest::Sha256);
    sealed
}

#[test]
fn test_struct_roundtrip() {
    let sealed = make_sealed();
    let bytes = to_vec(&sealed).unwrap();
    assert!(!bytes.is_empty());

    let decoded: SealedArchiveData = from_slice(&bytes).unwrap();
    assert_eq!(decoded, sealed);
}

#[test]
fn test_generic_writes_identical_bytes() {
    let from_struct = to_vec(&make_sealed()).unwrap();

    let mut writer = MemoryWriter::new();
    make_sealed_generic().write(&mut writer);
    let from_generic = writer.into_bytes().unwrap();

    assert_eq!(from_struct, from_generic);
}

#[test]
fn test_struct_reads_generic_stream() {
    let mut writer = MemoryWriter::new();
    make_sealed_generic().write(&mut writer);
    let bytes = writer.into_bytes().unwrap();

    let decoded: SealedArchiveData = from_slice(&bytes).unwrap();
    assert_eq!(decoded, make_sealed());
}

#[test]
fn test_generic_reads_struct_stream() {
    let bytes = to_vec(&make_sealed()).unwrap();

    let mut shape = Generic::new();
    let mut archive_shape = Generic::new();
    archive_shape
        .add_str(0u64, "")
        .add(2u64, 0u32)
        .add(4u64, 0i32)
        .add(6u64, 0u32);
    shape.add(0u64, archive_shape);
    shape.add(1u64, Binary::new());

    let mut reader = Reader::new(&bytes);
    shape.read(&mut reader);
    reader.status().unwrap();

    let archive = shape.value::<Generic>(0u64).unwrap();
    assert_eq!(archive.value::<String>(0u64), Some(&"Quake".to_string()));
    assert_eq!(archive.value::<u32>(2u64), Some(&1000));
    assert_eq!(archive.value::<i32>(4u64), Some(&-0x88));
    assert_eq!(archive.value::<u32>(6u64), Some(&0xc0));
    assert_eq!(
        shape.value::<Binary>(1u64),
        Some(&Binary::from(vec![0xde, 0xad, 0xbe, 0xef]))
    );
}

#[test]
fn test_newer_writer_fields_are_skipped() {
    let sealed = make_sealed();
    let mut bytes = to_vec(&sealed).unwrap();

    // A future writer appends a field this schema knows nothing about.
    let mut extra = MemoryWriter::new();
    extra.put_str(99u64, "added in v2");
    bytes.extend_from_slice(&extra.into_bytes().unwrap());

    let decoded: SealedArchiveData = from_slice(&bytes).unwrap();
    assert_eq!(decoded, sealed);
}

#[test]
fn test_older_writer_leaves_defaults_untouched() {
    // An older writer that only knew about the title.
    let mut writer = MemoryWriter::new();
    writer.put_str(0u64, "Doom");
    let bytes = writer.into_bytes().unwrap();

    let decoded: ArchiveData = from_slice(&bytes).unwrap();
    assert_eq!(decoded.title, "Doom");
    assert_eq!(decoded.work_dir, ".");
    assert_eq!(decoded.codec, Codec::Lzma);
    assert!(decoded.dirs.is_empty());
}

#[test]
fn test_untrimmed_stream_reads_back_equal() {
    // Zero-valued scalars and empty strings survive an untrimmed trip as
    // explicit chunks. (Containers must be non-empty here: a zero-length
    // container chunk is indistinguishable from a container holding one
    // default element, and the decoder picks the element.)
    let mut entry = EntryData {
        name: "setup.bin".to_string(),
        executable: false,
        ..EntryData::default()
    };
    entry.languages.insert("en".to_string());
    entry.platforms.push(Platform::Linux);

    let verbose = to_vec_with_trim(&entry, false).unwrap();
    let trimmed = to_vec(&entry).unwrap();
    assert!(verbose.len() > trimmed.len());

    let decoded: EntryData = from_slice(&verbose).unwrap();
    assert_eq!(decoded, entry);
}

#[test]
fn test_read_into_merges_over_existing_state() {
    let mut target = make_archive();

    // A delta stream carrying only a new note.
    let mut writer = MemoryWriter::new();
    writer.put_str(3u64, "patched");
    let bytes = writer.into_bytes().unwrap();

    read_into_slice(&bytes, &mut target).unwrap();
    assert_eq!(target.notes, "patched");
    assert_eq!(target.title, "Quake");
    assert_eq!(target.dirs.len(), 1);
}

mod flattened_base {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct NodeBase {
        id: u32,
        label: String,
    }

    token_map!(NodeBase {
        0 => id,
        1 => label,
    });

    #[derive(Debug, Default, Clone, PartialEq)]
    struct AnnotatedNode {
        base: NodeBase,
        weight: f64,
    }

    token_map!(AnnotatedNode {
        flatten base: NodeBase,
        5 => weight,
    });

    #[test]
    fn test_flattened_base_roundtrip() {
        let node = AnnotatedNode {
            base: NodeBase {
                id: 12,
                label: "gateway".to_string(),
            },
            weight: 0.5,
        };
        let bytes = to_vec(&node).unwrap();
        let decoded: AnnotatedNode = from_slice(&bytes).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_flattened_base_adds_no_framing() {
        let node = AnnotatedNode {
            base: NodeBase {
                id: 12,
                label: "gateway".to_string(),
            },
            weight: 0.5,
        };

        // The same chunks written by hand, without any base envelope.
        let mut writer = MemoryWriter::new();
        writer
            .put(0u64, &12u32)
            .put(1u64, &"gateway".to_string())
            .put(5u64, &0.5f64);

        assert_eq!(to_vec(&node).unwrap(), writer.into_bytes().unwrap());
    }

    #[test]
    fn test_base_fields_dispatch_through_derived_map() {
        let mut writer = MemoryWriter::new();
        writer.put(1u64, &"only label".to_string());
        let bytes = writer.into_bytes().unwrap();

        let decoded: AnnotatedNode = from_slice(&bytes).unwrap();
        assert_eq!(decoded.base.label, "only label");
        assert_eq!(decoded.base.id, 0);
    }
}
