use std::{
    fs, io,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use thiserror::Error;

const HEADER: &str = "name,token";

#[derive(Error, Debug)]
pub enum TokenBookError {
    #[error("failed to access token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed row {line} in token file {path}: {row:?}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        row: String,
    },
}

/// Session tokens by forklift name, kept across restarts in a two column CSV file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TokenBook {
    path: Option<PathBuf>,
    tokens: IndexMap<String, String>,
}

impl TokenBook {
    /// Reads the token file at `path`. A missing file gives an empty book saved to that path.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, TokenBookError> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(TokenBookError::Io { path, source }),
        };
        let tokens = parse(&path, &content)?;
        Ok(Self {
            path: Some(path),
            tokens,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn token_for(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, token: &str) {
        self.tokens.insert(name.to_owned(), token.to_owned());
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Writes the whole book. Does nothing for a book without a file.
    pub fn save(&self) -> Result<(), TokenBookError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        fs::write(path, self.to_csv()).map_err(|source| TokenBookError::Io {
            path: path.clone(),
            source,
        })
    }

    fn to_csv(&self) -> String {
        let mut csv = format!("{HEADER}\n");
        for (name, token) in &self.tokens {
            csv.push_str(&format!("{name},{token}\n"));
        }
        csv
    }
}

fn parse(path: &Path, content: &str) -> Result<IndexMap<String, String>, TokenBookError> {
    let mut tokens = IndexMap::new();
    for (index, row) in content.lines().enumerate() {
        let row = row.trim();
        if row.is_empty() || (index == 0 && row == HEADER) {
            continue;
        }
        match row.split_once(',') {
            Some((name, token)) if !name.is_empty() && !token.is_empty() => {
                tokens.insert(name.to_owned(), token.to_owned());
            }
            _ => {
                return Err(TokenBookError::MalformedRow {
                    path: path.to_owned(),
                    line: index + 1,
                    row: row.to_owned(),
                })
            }
        }
    }
    Ok(tokens)
}
