//! Input line grammar: `quit` or `<image_path>,<cache_directory>`.

use thiserror::Error;

/// Trimmed input that ends the request loop.
pub const QUIT_SENTINEL: &str = "quit";

/// One recognition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub image_path: String,
    /// Directory that receives this job's `face-<index>.jpg` crops.
    pub cache_directory: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    Run(Job),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected \"<image_path>,<cache_directory>\", found no comma")]
    MissingSeparator,
    #[error("expected exactly one comma, found {0}")]
    TooManySeparators(usize),
    #[error("{0} is empty")]
    EmptyField(&'static str),
}

/// Parse one input line. Surrounding whitespace is ignored, on the line and
/// on each field.
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line == QUIT_SENTINEL {
        return Ok(Command::Quit);
    }

    let (image_path, cache_directory) = line.split_once(',').ok_or(ParseError::MissingSeparator)?;
    if cache_directory.contains(',') {
        return Err(ParseError::TooManySeparators(line.matches(',').count()));
    }

    let image_path = image_path.trim();
    let cache_directory = cache_directory.trim();
    if image_path.is_empty() {
        return Err(ParseError::EmptyField("image_path"));
    }
    if cache_directory.is_empty() {
        return Err(ParseError::EmptyField("cache_directory"));
    }

    Ok(Command::Run(Job {
        image_path: image_path.to_string(),
        cache_directory: cache_directory.to_string(),
    }))
}
