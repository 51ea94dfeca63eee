use crate::{Arguments, Operation, Truncation};
use clap::{
    arg, crate_authors, crate_description, crate_name, crate_version, value_parser, Arg, ArgGroup,
    ArgMatches, Command,
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::{io, thread};

const COMPRESS_COMMAND: &str = "compress";
const EXTRACT_COMMAND: &str = "extract";

pub struct CLIParser {
    command: Command,
}

impl CLIParser {
    pub fn new() -> Self {
        let command = Self::create_base_command();
        let command = Self::register_threads_argument(command);
        let command = Self::register_compress_command(command);
        let command = Self::register_extract_command(command);
        CLIParser { command }
    }

    pub fn parse<I, T>(&mut self, itr: I) -> Arguments
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self
            .command
            .try_get_matches_from_mut(itr)
            .unwrap_or_else(|e| e.exit());
        Self::extract_arguments(&matches)
    }

    fn register_threads_argument(command: Command) -> Command {
        command.arg(Self::create_threads_argument())
    }

    fn register_compress_command(command: Command) -> Command {
        command.subcommand(Self::create_compress_command())
    }

    fn register_extract_command(command: Command) -> Command {
        command.subcommand(Self::create_extract_command())
    }

    fn register_input_file_argument(command: Command) -> Command {
        command.arg(Self::create_input_file_argument())
    }

    fn register_image_output_file_argument(command: Command) -> Command {
        command.arg(Self::create_image_output_file_argument())
    }

    fn register_factor_output_file_argument(command: Command) -> Command {
        command.arg(Self::create_factor_output_file_argument())
    }

    fn register_truncation_arguments(command: Command) -> Command {
        command
            .arg(Self::create_threshold_argument())
            .arg(Self::create_rank_argument())
            .group(
                ArgGroup::new("truncation")
                    .args(["threshold", "rank"])
                    .required(true),
            )
    }

    fn create_base_command() -> Command {
        Command::new(crate_name!())
            .version(crate_version!())
            .author(crate_authors!())
            .about(crate_description!())
            .subcommand_required(true)
            .arg_required_else_help(true)
    }

    fn create_compress_command() -> Command {
        let command = Command::new(COMPRESS_COMMAND)
            .about("Compose an image from the singular values of an image or factor file");
        let command = Self::register_input_file_argument(command);
        let command = Self::register_image_output_file_argument(command);
        Self::register_truncation_arguments(command)
    }

    fn create_extract_command() -> Command {
        let command = Command::new(EXTRACT_COMMAND)
            .about("Store the singular value decomposition of every image channel");
        let command = Self::register_input_file_argument(command);
        Self::register_factor_output_file_argument(command)
    }

    fn create_input_file_argument() -> Arg {
        Arg::new("input_file")
            .help("Path to image or factor input file")
            .value_parser(value_parser!(PathBuf))
            .required(true)
    }

    fn create_image_output_file_argument() -> Arg {
        Arg::new("output_file")
            .help("Path to image output file")
            .value_parser(value_parser!(PathBuf))
            .required(true)
    }

    fn create_factor_output_file_argument() -> Arg {
        Arg::new("output_file")
            .help("Path to factor output file (.json, .yaml, .xml or .bin)")
            .value_parser(value_parser!(PathBuf))
            .required(true)
    }

    fn create_threshold_argument() -> Arg {
        Arg::new("threshold")
            .help("Singular values up to this threshold are dropped")
            .value_parser(value_parser!(f64))
            .allow_negative_numbers(true)
    }

    fn create_rank_argument() -> Arg {
        arg!(-r --rank <RANK> "Number of leading singular values to keep, 0 keeps all")
            .value_parser(value_parser!(usize))
    }

    fn create_threads_argument() -> Arg {
        arg!(-t --threads <THREADS> "Number of Threads")
            .default_value(get_number_of_threads().unwrap_or(1).to_string())
            .required(false)
            .global(true)
            .value_parser(value_parser!(usize))
    }

    fn extract_arguments(matches: &ArgMatches) -> Arguments {
        // global arguments only propagate down into the subcommand
        let (operation, matches) = match matches.subcommand() {
            Some((COMPRESS_COMMAND, matches)) => {
                (Self::extract_compress_operation(matches), matches)
            }
            Some((EXTRACT_COMMAND, matches)) => (Self::extract_extract_operation(matches), matches),
            _ => unreachable!("a subcommand is required"),
        };
        Arguments {
            operation,
            number_of_threads: Self::extract_threads_argument(matches),
        }
    }

    fn extract_compress_operation(matches: &ArgMatches) -> Operation {
        Operation::Compress {
            input_file: Self::extract_input_file_argument(matches),
            output_file: Self::extract_output_file_argument(matches),
            truncation: Self::extract_truncation_arguments(matches),
        }
    }

    fn extract_extract_operation(matches: &ArgMatches) -> Operation {
        Operation::Extract {
            input_file: Self::extract_input_file_argument(matches),
            output_file: Self::extract_output_file_argument(matches),
        }
    }

    fn extract_input_file_argument(matches: &ArgMatches) -> PathBuf {
        matches
            .get_one::<PathBuf>("input_file")
            .expect("Required argument input_file not provided")
            .clone()
    }

    fn extract_output_file_argument(matches: &ArgMatches) -> PathBuf {
        matches
            .get_one::<PathBuf>("output_file")
            .expect("Required argument output_file not provided")
            .clone()
    }

    fn extract_truncation_arguments(matches: &ArgMatches) -> Truncation {
        if let Some(rank) = matches.get_one::<usize>("rank") {
            return Truncation::Rank(*rank);
        }
        let threshold = matches
            .get_one::<f64>("threshold")
            .expect("Either threshold or rank must be provided");
        Truncation::Threshold(*threshold)
    }

    fn extract_threads_argument(matches: &ArgMatches) -> usize {
        matches
            .get_one::<usize>("threads")
            .expect("Required argument threads not provided")
            .to_owned()
    }
}

impl Default for CLIParser {
    fn default() -> Self {
        Self::new()
    }
}

fn get_number_of_threads() -> io::Result<usize> {
    Ok(thread::available_parallelism()?.get())
}
