//! Your first token stream: declare a schema, encode, inspect, decode.
//!
//! Run with: `cargo run --example simple`

use tokenstream::{from_slice, to_vec, token_map};

#[derive(Debug, Default, PartialEq)]
struct Employee {
    first_name: String,
    last_name: String,
    birth_month: u8,
    birth_day: u8,
    birth_year: u16,
    badges: Vec<u32>,
}

token_map!(Employee {
    0 => first_name,
    1 => last_name,
    2 => birth_month,
    3 => birth_day,
    4 => birth_year,
    5 => badges,
});

fn main() {
    let employee = Employee {
        first_name: "Ford".to_string(),
        last_name: "Prefect".to_string(),
        birth_month: 9,
        birth_day: 21,
        birth_year: 1992,
        badges: vec![7, 42, 4242],
    };

    let bytes = to_vec(&employee).unwrap();
    println!("{} bytes on the wire:", bytes.len());
    for chunk in bytes.chunks(16) {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("  {}", hex.join(" "));
    }

    let decoded: Employee = from_slice(&bytes).unwrap();
    assert_eq!(decoded, employee);
    println!("decoded: {decoded:#?}");

    // Fields equal to their defaults never hit the wire.
    let sparse = Employee {
        first_name: "Zaphod".to_string(),
        ..Employee::default()
    };
    let sparse_bytes = to_vec(&sparse).unwrap();
    println!(
        "sparse record: {} bytes (only the first name is non-default)",
        sparse_bytes.len()
    );
}
