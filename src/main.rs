//! `ewfverify`: re-reads an EWF image chunk by chunk, rolls MD5/SHA-1 over
//! the decoded media stream and reports the acquisition hashes alongside
//! whatever the image has stored (spec.md §6's CLI surface). Comparing
//! and deciding pass/fail is this driver's job, not the verification
//! handle's — the handle only ever reports both sides.

use clap::{Arg, ArgAction, Command};
use exhume_ewf::ewf::pipeline::CompressionMode;
use exhume_ewf::ewf::verify::VerificationHandle;
use exhume_ewf::EwfHandle;
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

fn parse_compression(value: &str) -> CompressionMode {
    match value {
        "n" | "e" => CompressionMode::None,
        "f" => CompressionMode::Fast,
        "b" => CompressionMode::Best,
        _ => CompressionMode::Fast,
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let matches = Command::new("ewfverify")
        .version(env!("CARGO_PKG_VERSION"))
        .author("k1nd0ne")
        .about("Verifies the acquisition hashes stored in an EWF image against a fresh re-read.")
        .arg(
            Arg::new("input")
                .required(true)
                .help("Path to any one segment of the image (e.g. case.E01)."),
        )
        .arg(
            Arg::new("chunk_size")
                .short('b')
                .long("chunk-size")
                .value_parser(clap_num::si_number::<u32>)
                .help("Override the declared sectors-per-chunk size, in sectors."),
        )
        .arg(
            Arg::new("media_size")
                .short('B')
                .long("media-size")
                .value_parser(clap_num::si_number::<u64>)
                .help("Verify only the first N bytes of media."),
        )
        .arg(
            Arg::new("compression")
                .short('c')
                .long("compression")
                .value_parser(["n", "e", "f", "b"])
                .default_value("f")
                .help("Compression mode for a subsequent write path: none/empty/fast/best."),
        )
        .arg(
            Arg::new("max_segment_size")
                .short('S')
                .long("max-segment-size")
                .value_parser(clap_num::si_number::<u64>)
                .help("Maximum size of a single segment file when writing."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let input = PathBuf::from(matches.get_one::<String>("input").unwrap());
    let verbose = matches.get_flag("verbose");

    let mut handle = EwfHandle::initialize();
    if let Some(max_segment_size) = matches.get_one::<u64>("max_segment_size") {
        handle.set_maximum_segment_size(*max_segment_size);
    }
    if let Some(sectors_per_chunk) = matches.get_one::<u32>("chunk_size") {
        handle.set_sectors_per_chunk(*sectors_per_chunk);
    }
    handle.set_compression_values(parse_compression(matches.get_one::<String>("compression").unwrap()));

    if let Err(e) = handle.open(&[input.clone()]) {
        error!("failed to open {}: {e}", input.display());
        return ExitCode::FAILURE;
    }

    if verbose {
        handle.print_info();
    }

    let mut verifier = VerificationHandle::initialize(true, true);
    let report = match verifier.run(&mut handle) {
        Ok(report) => report,
        Err(e) => {
            error!("verification failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    print!("{}", verifier.additional_hash_values_fprint(&report));
    print!("{}", verifier.checksum_errors_fprint(&handle));

    let md5_matches = !report.md5_available || report.md5_computed == report.md5_stored;
    let sha1_matches = !report.sha1_available || report.sha1_computed == report.sha1_stored;

    if report.number_of_checksum_errors == 0 && md5_matches && sha1_matches {
        println!("\nVerification passed.");
        ExitCode::SUCCESS
    } else {
        println!("\nVerification failed.");
        ExitCode::FAILURE
    }
}
