//! Building and reading records at runtime, without a compiled-in schema.
//!
//! Run with: `cargo run --example generic_records`

use tokenstream::{Generic, MemoryWriter, Reader};

fn main() {
    // A writer that learned the schema from a config file, say.
    let mut packet = Generic::new();
    packet
        .add(0u64, 7u32)
        .add_str(1u64, "sensor-array-3")
        .add(2u64, 21.5f64)
        .add_with_default(3u64, 0u8, 0u8); // trims away

    let mut writer = MemoryWriter::new();
    packet.write(&mut writer);
    let bytes = writer.into_bytes().unwrap();
    println!("{} bytes: {:02x?}", bytes.len(), bytes);

    // The reader registers the fields it cares about, then walks the
    // stream. Unregistered tokens would be skipped silently.
    let mut decoded = Generic::new();
    decoded.add(0u64, 0u32).add(2u64, 0.0f64);

    let mut reader = Reader::new(&bytes);
    decoded.read(&mut reader);
    reader.status().unwrap();

    println!("id      = {:?}", decoded.value::<u32>(0u64));
    println!("reading = {:?}", decoded.value::<f64>(2u64));
}
