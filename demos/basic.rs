// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Basic example streaming a gzip round-trip through the software accelerator.
//!
//! Run with: `cargo run --example basic`

use hzip_bridge::{
    AlgType, Direction, Flush, Session, SessionConfig, SoftAccelerator, SoftChannel, StepStatus,
    ZipResult,
};

/// Push `data` through one stream using small caller buffers.
fn stream(session: &mut Session<SoftChannel>, data: &[u8], chunk: usize) -> ZipResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    let mut pos = 0;
    let mut steps = 0;
    loop {
        let end = (pos + chunk).min(data.len());
        let flush = if end == data.len() {
            Flush::Finish
        } else {
            Flush::None
        };
        let step = session.step(&data[pos..end], &mut buf, flush)?;
        pos += step.bytes_read;
        out.extend_from_slice(&buf[..step.bytes_written]);
        steps += 1;
        if step.status == StepStatus::FinishDone {
            println!("  {} steps, {} -> {} bytes", steps, data.len(), out.len());
            return Ok(out);
        }
    }
}

fn main() {
    println!("Hardware Zip Bridge Basic Example");
    println!("=================================\n");

    let accel = SoftAccelerator::new();
    let config = SessionConfig::default()
        .with_in_capacity(16 * 1024)
        .with_out_capacity(SessionConfig::min_out_capacity(16 * 1024));

    let text: Vec<u8> = b"The quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(100_000)
        .collect();

    println!("Compressing...");
    let mut deflater = match Session::init(&accel, Direction::Compress, AlgType::Gzip, config.clone()) {
        Ok(session) => session,
        Err(e) if e.is_setup_failure() => {
            println!("  Accelerator unavailable ({}), a software codec would take over.", e);
            return;
        }
        Err(e) => {
            println!("  Failed to open session: {}", e);
            return;
        }
    };
    let compressed = match stream(&mut deflater, &text, 4096) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("  Compression failed: {}", e);
            return;
        }
    };
    println!("  CRC32: {:#010x}", deflater.checksum());
    deflater.end();
    println!();

    println!("Decompressing...");
    let mut inflater = match Session::init(&accel, Direction::Decompress, AlgType::Gzip, config) {
        Ok(session) => session,
        Err(e) => {
            println!("  Failed to open session: {}", e);
            return;
        }
    };
    match stream(&mut inflater, &compressed, 1000) {
        Ok(plain) => println!("  Data matches: {}", plain == text),
        Err(e) => println!("  Decompression failed: {}", e),
    }
    println!();

    let stats = accel.stats();
    println!(
        "Accelerator: {} descriptors, {} channels opened, {} closed",
        stats.submitted(),
        stats.opened(),
        stats.closed()
    );
    println!("\nDone!");
}
