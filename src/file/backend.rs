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

//! Storage backends for loaded modules: memory-mapped files and owned buffers.

use std::{fs, path::Path};

use memmap2::Mmap;

use crate::Result;

/// Byte storage behind a [`crate::file::File`].
pub trait Backend: Send + Sync {
    /// Complete contents.
    fn data(&self) -> &[u8];

    /// Bounds-checked sub-slice.
    ///
    /// # Errors
    /// Returns an error if the range does not lie within the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let data = self.data();
        match offset.checked_add(len) {
            Some(end) if end <= data.len() => Ok(&data[offset..end]),
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Total length in bytes.
    fn len(&self) -> usize {
        self.data().len()
    }
}

/// A module mapped read-only from disk.
#[derive(Debug)]
pub struct Mapped {
    data: Mmap,
}

impl Mapped {
    /// Maps the file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Mapped> {
        let file = fs::File::open(path)?;
        // The mapping is read-only and the file is not modified while a compilation runs
        let data = unsafe { Mmap::map(&file) }?;
        Ok(Mapped { data })
    }
}

impl Backend for Mapped {
    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

/// A module held in an owned buffer.
#[derive(Debug)]
pub struct Owned {
    data: Vec<u8>,
}

impl Owned {
    /// Takes ownership of `data`.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Owned {
        Owned { data }
    }
}

impl Backend for Owned {
    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_slices() {
        let mut data = vec![0xCC_u8; 64];
        data[10..14].copy_from_slice(&[0xBB; 4]);
        let owned = Owned::new(data);

        assert_eq!(owned.len(), 64);
        assert_eq!(owned.data_slice(10, 4).unwrap(), &[0xBB; 4]);
        assert!(owned.data_slice(62, 4).is_err());
        assert!(owned.data_slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn mapped_missing_file() {
        assert!(Mapped::new("/definitely/not/here.dll").is_err());
    }
}
