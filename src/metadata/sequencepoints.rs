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

//! Sequence points of Portable PDB `MethodDebugInformation` rows.
//!
//! The blob maps IL offsets to source positions:
//!
//! ```text
//! Blob   ::= header SequencePointRecord (SequencePointRecord | DocumentRecord)*
//! header ::= LocalSignature [InitialDocument]
//! ```
//!
//! The first record stores its IL offset absolutely, later ones as deltas. A record with
//! `ΔLines == 0 && ΔColumns == 0` is hidden; hidden points are reported with the sentinel
//! line [`HIDDEN_LINE`] and yield no source mapping. A zero IL delta after the first record
//! switches the current document.

use crate::{file::parser::Parser, Result};

/// Line number reported for hidden sequence points.
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// One mapping from an IL offset to a source range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePoint {
    /// Offset in the method's IL stream
    pub il_offset: u32,
    /// Row of the `Document` table
    pub document: u32,
    /// Starting line, [`HIDDEN_LINE`] for hidden points
    pub start_line: u32,
    /// Starting column
    pub start_col: u32,
    /// Ending line
    pub end_line: u32,
    /// Ending column
    pub end_col: u32,
}

impl SequencePoint {
    /// True for hidden points.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.start_line == HIDDEN_LINE
    }

    /// Source line, `None` for hidden points.
    #[must_use]
    pub fn line(&self) -> Option<u32> {
        if self.is_hidden() {
            None
        } else {
            Some(self.start_line)
        }
    }
}

/// Sequence points of one method in IL offset order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequencePoints(pub Vec<SequencePoint>);

impl SequencePoints {
    /// The point that covers `il_offset`: the last one starting at or before it.
    #[must_use]
    pub fn find_by_il_offset(&self, il_offset: u32) -> Option<&SequencePoint> {
        self.0
            .iter()
            .take_while(|point| point.il_offset <= il_offset)
            .last()
    }

    /// Source line for `il_offset`; `None` if no point covers it or the covering point is hidden.
    #[must_use]
    pub fn line_for(&self, il_offset: u32) -> Option<u32> {
        self.find_by_il_offset(il_offset).and_then(SequencePoint::line)
    }

    /// True if there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parses a sequence points blob.
///
/// `document` is the `MethodDebugInformation.Document` column; when it is 0 the blob carries
/// the initial document itself.
///
/// # Errors
/// Returns an error if the blob is truncated or a value overflows.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn parse_sequence_points(blob: &[u8], document: u32) -> Result<SequencePoints> {
    let mut parser = Parser::new(blob);
    let mut points = Vec::new();
    if !parser.has_more_data() {
        return Ok(SequencePoints(points));
    }

    let _local_signature = parser.read_compressed_uint()?;
    let mut document = if document == 0 {
        parser.read_compressed_uint()?
    } else {
        document
    };

    let mut il_offset = 0_u32;
    let mut start_line = 0_i64;
    let mut start_col = 0_i64;
    let mut first_record = true;
    let mut first_visible = true;

    while parser.has_more_data() {
        let il_delta = parser.read_compressed_uint()?;
        if !first_record && il_delta == 0 {
            document = parser.read_compressed_uint()?;
            continue;
        }

        il_offset = if first_record {
            il_delta
        } else {
            il_offset
                .checked_add(il_delta)
                .ok_or_else(|| malformed_error!("IL offset overflow in sequence points"))?
        };
        first_record = false;

        let delta_lines = parser.read_compressed_uint()?;
        let delta_columns = if delta_lines == 0 {
            i64::from(parser.read_compressed_uint()?)
        } else {
            i64::from(parser.read_compressed_int()?)
        };

        if delta_lines == 0 && delta_columns == 0 {
            points.push(SequencePoint {
                il_offset,
                document,
                start_line: HIDDEN_LINE,
                start_col: 0,
                end_line: HIDDEN_LINE,
                end_col: 0,
            });
            continue;
        }

        if first_visible {
            start_line = i64::from(parser.read_compressed_uint()?);
            start_col = i64::from(parser.read_compressed_uint()?);
            first_visible = false;
        } else {
            start_line += i64::from(parser.read_compressed_int()?);
            start_col += i64::from(parser.read_compressed_int()?);
        }

        let end_line = start_line + i64::from(delta_lines);
        let end_col = start_col + delta_columns;
        if start_line < 0 || start_col < 0 || end_col < 0 || end_line > i64::from(u32::MAX) {
            return Err(malformed_error!(
                "Sequence point out of range at IL offset {}",
                il_offset
            ));
        }

        points.push(SequencePoint {
            il_offset,
            document,
            start_line: start_line as u32,
            start_col: start_col as u32,
            end_line: end_line as u32,
            end_col: end_col as u32,
        });
    }

    Ok(SequencePoints(points))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_points_with_deltas() {
        // local sig 0; IL 0 line 10 col 5..15; IL +4 line +2 col -1, 3 columns wide
        #[rustfmt::skip]
        let blob = [
            0x00,
            0x00, 0x00, 0x0A, 0x0A, 0x05,
            0x04, 0x00, 0x03, 0x04, 0x7F,
        ];
        let points = parse_sequence_points(&blob, 1).unwrap();
        assert_eq!(points.0.len(), 2);
        assert_eq!(points.0[0].start_line, 10);
        assert_eq!(points.0[0].start_col, 5);
        assert_eq!(points.0[0].end_col, 15);
        assert_eq!(points.0[1].il_offset, 4);
        assert_eq!(points.0[1].start_line, 12);
        assert_eq!(points.0[1].start_col, 4);
        assert_eq!(points.0[1].end_col, 7);
        assert_eq!(points.line_for(6), Some(12));
    }

    #[test]
    fn hidden_points_have_no_mapping() {
        // IL 0 visible at line 3; IL 2 hidden
        let blob = [0x00, 0x00, 0x00, 0x01, 0x03, 0x01, 0x02, 0x00, 0x00];
        let points = parse_sequence_points(&blob, 1).unwrap();
        assert!(points.0[1].is_hidden());
        assert_eq!(points.0[1].start_line, HIDDEN_LINE);
        assert_eq!(points.line_for(0), Some(3));
        assert_eq!(points.line_for(2), None);
        assert_eq!(points.line_for(100), None);
    }

    #[test]
    fn document_records() {
        // initial document 2 in the header, switch to 5 before the second point
        #[rustfmt::skip]
        let blob = [
            0x00, 0x02,
            0x00, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x05,
            0x03, 0x00, 0x01, 0x02, 0x00,
        ];
        let points = parse_sequence_points(&blob, 0).unwrap();
        assert_eq!(points.0[0].document, 2);
        assert_eq!(points.0[1].document, 5);
        assert_eq!(points.0[1].il_offset, 3);
        assert_eq!(points.0[1].start_line, 2);
    }

    #[test]
    fn empty_blob() {
        assert!(parse_sequence_points(&[], 1).unwrap().is_empty());
    }
}
