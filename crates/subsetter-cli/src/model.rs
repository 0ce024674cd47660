//! Loading an `ExtractionModel` from a TOML file.

use std::path::Path;

use subsetter_core::ExtractionModel;

use crate::error::{CliError, CliResult};

pub fn load_model(path: &Path) -> CliResult<ExtractionModel> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::ReadModel {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| CliError::ParseModel {
        path: path.display().to_string(),
        source,
    })
}
