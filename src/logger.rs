use std::path::Path;

use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

const LOG_CONFIG_FILE: &str = "log4rs.yaml";
const FALLBACK_PATTERN: &str = "{d(%H:%M:%S)} {h({l:<5})} {t} - {m}{n}";

#[ctor::ctor]
fn init() {
    if Path::new(LOG_CONFIG_FILE).is_file()
        && log4rs::init_file(LOG_CONFIG_FILE, Default::default()).is_ok()
    {
        return;
    }
    if let Ok(config) = fallback_config() {
        let _ = log4rs::init_config(config);
    }
}

fn fallback_config() -> Result<Config, log4rs::config::runtime::ConfigErrors> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(FALLBACK_PATTERN)))
        .build();
    Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(LevelFilter::Warn))
}

pub fn log_factors(index: usize, rows: usize, cols: usize, singular_values: &[f64]) {
    let leading: Vec<String> = singular_values
        .iter()
        .take(4)
        .map(|value| format!("{:.3}", value))
        .collect();
    log::debug!(
        "Channel {} ({}x{}): {} singular values, leading {:?}",
        index,
        rows,
        cols,
        singular_values.len(),
        leading
    );
}
