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

//! PE container access for managed modules.
//!
//! A [`File`] owns the raw bytes of a module (memory-mapped or in memory) together with the
//! `goblin` PE view borrowing them. Only files carrying a CLR runtime header are accepted,
//! everything else is rejected at load time.
//!
//! # Key Components
//!
//! - [`File`] - the loaded PE image with RVA translation
//! - [`parser::Parser`] - cursor over blobs, signatures and bytecode
//! - [`io`] - bounds-checked little-endian primitives

pub mod io;
pub mod parser;

mod backend;

use std::path::Path;

use goblin::pe::PE;
use ouroboros::self_referencing;

use crate::{
    Error::{Empty, GoblinErr},
    Result,
};
pub use backend::Backend;
use backend::{Mapped, Owned};

/// A loaded PE image containing a CLR module.
#[self_referencing]
pub struct File {
    data: Box<dyn Backend>,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Maps and parses the file at `file`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not a PE image, or has no CLR header.
    pub fn from_file(file: &Path) -> Result<File> {
        Self::load(Mapped::new(file)?)
    }

    /// Parses an image held in memory.
    ///
    /// # Errors
    /// Returns an error if the data is not a PE image or has no CLR header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Owned::new(data))
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        File::try_new(Box::new(data), |data| {
            let pe = PE::parse(data.data()).map_err(GoblinErr)?;
            let has_clr = pe
                .header
                .optional_header
                .and_then(|header| header.data_directories.get_clr_runtime_header().copied())
                .is_some_and(|dir| dir.virtual_address != 0);

            if has_clr {
                Ok(pe)
            } else {
                Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                ))
            }
        })
    }

    /// Size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_data(|data| data.len())
    }

    /// True if the image is empty (never the case for a loaded file).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the image is a DLL rather than an executable.
    #[must_use]
    pub fn is_dll(&self) -> bool {
        self.with_pe(|pe| pe.is_lib)
    }

    /// RVA and size of the CLR runtime header.
    ///
    /// # Errors
    /// Returns an error if the directory is missing.
    pub fn clr(&self) -> Result<(usize, usize)> {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .and_then(|header| header.data_directories.get_clr_runtime_header().copied())
                .map(|dir| (dir.virtual_address as usize, dir.size as usize))
                .ok_or_else(|| malformed_error!("File does not have a CLR runtime header"))
        })
    }

    /// Complete image contents.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// Bounds-checked slice of the image.
    ///
    /// # Errors
    /// Returns an error if the range lies outside the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// Translates a relative virtual address into a file offset.
    ///
    /// # Errors
    /// Returns an error if no section contains the address.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        let rva_u32 =
            u32::try_from(rva).map_err(|_| malformed_error!("RVA too large to fit in u32: {}", rva))?;

        self.with_pe(|pe| {
            for section in &pe.sections {
                let size = section.virtual_size.max(section.size_of_raw_data);
                let Some(section_max) = section.virtual_address.checked_add(size) else {
                    return Err(malformed_error!(
                        "Section malformed, causing integer overflow - {} + {}",
                        section.virtual_address,
                        size
                    ));
                };

                if section.virtual_address <= rva_u32 && rva_u32 < section_max {
                    return Ok((rva_u32 - section.virtual_address) as usize
                        + section.pointer_to_raw_data as usize);
                }
            }

            Err(malformed_error!("RVA could not be converted to offset - {}", rva))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
        assert!(File::from_mem(vec![0u8; 128]).is_err());
    }
}
