use std::fs::File;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};

/// init wires the process-wide logger: the console receives Info and above,
/// the log file under ./logs receives Debug as well when debug is set.
/// Returns the log file path.
pub fn init(debug: bool) -> anyhow::Result<PathBuf> {
    let timestr = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let filename = format!("migrate_log_{}.log", timestr);

    let log_dir = Path::new("./logs");
    std::fs::create_dir_all(log_dir)
        .map_err(|e| anyhow!("failed to create log path: {}", e))?;
    let log_path = log_dir.join(filename);

    let file = File::create(&log_path)
        .map_err(|e| anyhow!("failed to open log file {:?}: {}", log_path, e))?;
    let file_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(file_level, Config::default(), file),
    ];
    CombinedLogger::init(loggers).map_err(|e| anyhow!("failed to init logger: {}", e))?;

    Ok(log_path)
}
