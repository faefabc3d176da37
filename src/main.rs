use clap::{Arg, ArgAction, Command};
use clap_num::maybe_hex;
use exhume_body::Body;
use log::LevelFilter;
use std::process;

use exhume_journal::{
    analyze, estimated_transaction_count, locate_journal, CsvEmitter, ImageFormat, ImageReader,
    SequenceFilter,
};

fn main() {
    let matches = Command::new("exhume_journal")
        .version("0.1.0")
        .author("ForensicXlab")
        .about("Exhume the JBD/JBD2 journal of an ext3/ext4 partition into a forensic timeline.")
        .arg(
            Arg::new("image")
                .short('i')
                .long("image")
                .value_parser(clap::value_parser!(String))
                .required(true)
                .help("The path to the image to exhume."),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(clap::value_parser!(String))
                .required(true)
                .help("Output CSV file path."),
        )
        .arg(
            Arg::new("type")
                .short('t')
                .long("type")
                .value_parser(clap::value_parser!(String))
                .default_value("auto")
                .help("The image type: 'auto', 'raw' or 'ewf'."),
        )
        .arg(
            Arg::new("journal_offset")
                .long("journal-offset")
                .value_parser(maybe_hex::<u64>)
                .help("Manual journal offset in bytes, relative to the partition start."),
        )
        .arg(
            Arg::new("journal_size")
                .long("journal-size")
                .value_parser(maybe_hex::<u64>)
                .help("Manual journal size in bytes."),
        )
        .arg(
            Arg::new("partition_offset")
                .long("partition-offset")
                .value_parser(maybe_hex::<u64>)
                .conflicts_with("partition_offset_bytes")
                .help("Partition offset in sectors (see --sector-size)."),
        )
        .arg(
            Arg::new("partition_offset_bytes")
                .long("partition-offset-bytes")
                .value_parser(maybe_hex::<u64>)
                .help("Partition offset in bytes."),
        )
        .arg(
            Arg::new("sector_size")
                .long("sector-size")
                .value_parser(clap::value_parser!(u64))
                .default_value("512")
                .help("Sector size in bytes used by --partition-offset."),
        )
        .arg(
            Arg::new("start_seq")
                .long("start-seq")
                .value_parser(maybe_hex::<u32>)
                .help("Skip transactions below this sequence number."),
        )
        .arg(
            Arg::new("end_seq")
                .long("end-seq")
                .value_parser(maybe_hex::<u32>)
                .help("Stop at the first transaction above this sequence number."),
        )
        .arg(
            Arg::new("no_header")
                .long("no-header")
                .action(ArgAction::SetTrue)
                .help("Omit the CSV header row."),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the forensic summary as JSON instead of a table."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let image_path = matches.get_one::<String>("image").unwrap();
    let output_path = matches.get_one::<String>("output").unwrap();
    let type_hint = matches.get_one::<String>("type").unwrap();
    let verbose = matches.get_flag("verbose");
    let json = matches.get_flag("json");
    let no_header = matches.get_flag("no_header");
    let journal_offset = matches.get_one::<u64>("journal_offset").copied();
    let journal_size = matches.get_one::<u64>("journal_size").copied();
    let sector_size = *matches.get_one::<u64>("sector_size").unwrap();

    env_logger::Builder::from_default_env()
        .filter_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init();

    let format = match ImageFormat::resolve(type_hint, image_path) {
        Ok(format) => format,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };

    if !(1..=8192).contains(&sector_size) {
        eprintln!("Error: Invalid sector size {}. Must be between 1 and 8192 bytes.", sector_size);
        process::exit(1);
    }
    let partition_offset = match (
        matches.get_one::<u64>("partition_offset"),
        matches.get_one::<u64>("partition_offset_bytes"),
    ) {
        (Some(sectors), None) => sectors * sector_size,
        (None, Some(bytes)) => *bytes,
        _ => 0,
    };
    // 1 TiB is past the end of any partition this tool is pointed at; most
    // likely a sectors/bytes mix-up.
    if partition_offset > 1u64 << 40 {
        eprintln!(
            "Warning: partition offset ({} bytes) is unusually large.",
            partition_offset
        );
    }

    if !std::path::Path::new(image_path).exists() {
        eprintln!("Error: Cannot open image file: {}", image_path);
        process::exit(1);
    }

    let mut body = Body::new_from(image_path.to_string(), format.as_str(), None);
    if verbose {
        body.print_info();
    }

    let mut reader = ImageReader::new(body);
    reader.set_partition_offset(partition_offset);

    let location = match locate_journal(&mut reader, journal_offset, journal_size) {
        Ok(location) => location,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };
    if verbose {
        println!(
            "Journal at offset {} ({} bytes, ~{} transactions)",
            location.offset,
            location.size,
            estimated_transaction_count(&location)
        );
    }

    let mut emitter = match CsvEmitter::create(output_path, !no_header) {
        Ok(emitter) => emitter,
        Err(err) => {
            eprintln!("Error: Cannot create output file {}: {}", output_path, err);
            process::exit(1);
        }
    };

    let filter = SequenceFilter {
        start: matches.get_one::<u32>("start_seq").copied(),
        end: matches.get_one::<u32>("end_seq").copied(),
    };

    match analyze(&mut reader, location, filter, &mut emitter) {
        Ok(summary) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary.to_json()).unwrap());
            } else {
                println!("{}", summary.render());
            }
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }
}
