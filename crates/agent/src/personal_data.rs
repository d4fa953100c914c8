//! Loads an owner's personal data files and reduces them to a size the
//! backend can digest.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

pub const BASIC_INFO_FILE: &str = "basic_info.json";
pub const INTERACTION_FILE: &str = "user_ai_interaction_data.json";
pub const LARGE_FILE_BYTES: usize = 10 * 1024;
pub const PREFERENCES_CHAR_LIMIT: usize = 4_000;
const RECENT_SESSIONS: usize = 2;
const TRUNCATED_NOTE: &str = "\n\n[Additional data truncated for efficiency]";

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("personal data directory `{0}` does not exist; is the owner name correct?")]
    MissingOwnerDirectory(PathBuf),
    #[error("could not read personal data directory `{path}`: {source}")]
    ReadDirectory { path: PathBuf, source: std::io::Error },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceContent {
    /// Reduced JSON to be queried for task-relevant information.
    Data(String),
    /// Replaces the finding when the file could not be processed.
    Unreadable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersonalDataSource {
    pub name: String,
    pub content: SourceContent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersonalDataset {
    pub basic_info: Option<String>,
    pub sources: Vec<PersonalDataSource>,
}

pub fn owner_directory(root: &Path, owner: &str) -> PathBuf {
    root.join(owner)
}

/// Reads `<root>/<owner>/*.json` in file-name order.
pub fn load_owner_data(root: &Path, owner: &str) -> Result<PersonalDataset, ProfileError> {
    let directory = owner_directory(root, owner);
    if !directory.is_dir() {
        return Err(ProfileError::MissingOwnerDirectory(directory));
    }

    let read_error = |source| ProfileError::ReadDirectory { path: directory.clone(), source };
    let mut files = fs::read_dir(&directory)
        .map_err(read_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect::<Vec<_>>();
    files.sort();

    let mut dataset = PersonalDataset::default();
    for path in files {
        let file_name =
            path.file_name().and_then(|name| name.to_str()).unwrap_or_default().to_string();
        let name = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default().to_string();

        if file_name == BASIC_INFO_FILE {
            match fs::read_to_string(&path) {
                Ok(text) => dataset.basic_info = Some(text),
                Err(error) => {
                    warn!(event_name = "profile.basic_info.unreadable", error = %error, "skipping basic info");
                }
            }
            continue;
        }

        let content = if file_name == INTERACTION_FILE {
            read_interaction_file(&path)
        } else {
            read_regular_file(&path, &file_name)
        };
        dataset.sources.push(PersonalDataSource { name, content });
    }

    Ok(dataset)
}

fn read_interaction_file(path: &Path) -> SourceContent {
    let parsed = fs::read_to_string(path)
        .map_err(|error| error.to_string())
        .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|error| error.to_string()));

    let reduced = match parsed {
        Ok(value) => reduce_interaction_data(value),
        Err(error) => json!({
            "Note": format!("User interaction data available but could not be processed: {error}")
        }),
    };
    SourceContent::Data(pretty(&reduced))
}

fn read_regular_file(path: &Path, file_name: &str) -> SourceContent {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) => return SourceContent::Unreadable(format!("Error processing {file_name}: {error}")),
    };

    if text.len() > LARGE_FILE_BYTES {
        let note = json!({
            "file": file_name,
            "note": "Large file available but not processed in detail for efficiency"
        });
        return SourceContent::Data(pretty(&note));
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => SourceContent::Data(pretty(&value)),
        Err(error) => SourceContent::Unreadable(format!("Error processing {file_name}: {error}")),
    }
}

/// Keeps the most recent sessions and, within each, only the first two and
/// last two interactions.
pub fn reduce_interaction_data(value: Value) -> Value {
    let name = value.get("Name").cloned().unwrap_or_else(|| json!(""));
    let Some(sessions) = value.get("Data").and_then(Value::as_array) else {
        return json!({
            "Name": name,
            "Summary": "Interaction history available but not processed in detail"
        });
    };

    let start = sessions.len().saturating_sub(RECENT_SESSIONS);
    let recent = sessions[start..].iter().cloned().map(trim_session).collect::<Vec<_>>();
    json!({ "Name": name, "Data": recent })
}

fn trim_session(mut session: Value) -> Value {
    if let Some(interactions) =
        session.get_mut("user_ai_interaction").and_then(Value::as_array_mut)
    {
        if interactions.len() > 4 {
            let len = interactions.len();
            let kept = vec![
                interactions[0].clone(),
                interactions[1].clone(),
                interactions[len - 2].clone(),
                interactions[len - 1].clone(),
            ];
            *interactions = kept;
        }
    }
    session
}

/// Caps joined findings at [`PREFERENCES_CHAR_LIMIT`] characters.
pub fn cap_findings(text: &str) -> String {
    if text.chars().count() <= PREFERENCES_CHAR_LIMIT {
        return text.to_string();
    }
    let mut capped = text.chars().take(PREFERENCES_CHAR_LIMIT).collect::<String>();
    capped.push_str(TRUNCATED_NOTE);
    capped
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
