// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Locating referenced modules on disk.
//!
//! Probing order for a referenced assembly `Name`:
//!
//! 1. `{root dir}/Name.dll`, `{root dir}/Name.exe`
//! 2. the same inside every `privatePath` directory of `{root}.config`
//! 3. the same inside every extra search directory, in the order they were added

use std::path::{Path, PathBuf};

use quick_xml::{events::Event, Reader};
use sha1::{Digest, Sha1};

use crate::{file::io::read_le, Error, Result};

/// File extensions tried for each directory, in order.
const EXTENSIONS: [&str; 2] = ["dll", "exe"];

/// Public key token of a full public key: the last 8 bytes of its SHA-1 hash.
///
/// # Errors
/// Never fails for a SHA-1 digest; the error path is the generic little-endian read.
pub fn public_key_token(public_key: &[u8]) -> Result<u64> {
    let mut hasher = Sha1::new();
    hasher.update(public_key);
    let digest = hasher.finalize();
    read_le::<u64>(&digest[digest.len() - 8..])
}

/// Directories listed in `<probing privatePath="a;b"/>` of an application configuration.
///
/// # Errors
/// Returns [`Error::Configuration`] if the document is not well-formed XML.
pub fn private_paths(config_xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(config_xml);
    reader.config_mut().trim_text(true);

    let mut paths = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(element) | Event::Empty(element))
                if element.local_name().as_ref() == b"probing" =>
            {
                for attribute in element.attributes() {
                    let attribute = attribute.map_err(|error| {
                        Error::Configuration(format!("invalid probing attribute - {error}"))
                    })?;
                    if attribute.key.local_name().as_ref() != b"privatePath" {
                        continue;
                    }
                    let value = attribute.unescape_value().map_err(|error| {
                        Error::Configuration(format!("invalid privatePath - {error}"))
                    })?;
                    paths.extend(
                        value
                            .split(';')
                            .map(str::trim)
                            .filter(|path| !path.is_empty())
                            .map(str::to_string),
                    );
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(error) => {
                return Err(Error::Configuration(format!(
                    "invalid application configuration at {} - {}",
                    reader.error_position(),
                    error
                )))
            }
        }
    }

    Ok(paths)
}

/// Ordered list of directories referenced modules are searched in.
#[derive(Debug, Clone, Default)]
pub struct ProbePaths {
    directories: Vec<PathBuf>,
}

impl ProbePaths {
    /// Builds the search list for a root module.
    ///
    /// `private_paths` are relative to the root module's directory.
    #[must_use]
    pub fn new(root: &Path, private_paths: &[String], extra: &[PathBuf]) -> Self {
        let base = root.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut directories = vec![base.clone()];
        directories.extend(private_paths.iter().map(|path| base.join(path)));
        directories.extend(extra.iter().cloned());
        ProbePaths { directories }
    }

    /// Every candidate file for assembly `name`, in probing order.
    #[must_use]
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        self.directories
            .iter()
            .flat_map(|directory| {
                EXTENSIONS
                    .iter()
                    .map(move |extension| directory.join(format!("{name}.{extension}")))
            })
            .collect()
    }

    /// First existing candidate for `name`.
    ///
    /// # Errors
    /// Returns [`Error::ModuleNotFound`] listing every probed path.
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        let candidates = self.candidates(name);
        if let Some(found) = candidates.iter().find(|candidate| candidate.is_file()) {
            log::debug!("Located '{}' at {}", name, found.display());
            return Ok(found.clone());
        }

        Err(Error::ModuleNotFound {
            name: name.to_string(),
            searched: candidates
                .iter()
                .map(|candidate| candidate.display().to_string())
                .collect(),
        })
    }
}
