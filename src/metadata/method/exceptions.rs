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

use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    /// Kind of an exception handling clause (II.25.4.6).
    ///
    /// `EXCEPTION` is zero, so use [`ExceptionHandler::kind`] instead of `contains`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// A fault clause, a finally that only runs on exceptions
        const FAULT = 0x0004;
    }
}

/// Decoded clause kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionHandlerKind {
    /// `catch (T)`
    Catch,
    /// `filter { } handler { }`
    Filter,
    /// `finally`
    Finally,
    /// `fault`
    Fault,
}

/// One exception handling clause of a method body.
///
/// ```text
/// try {            // try_offset .. try_offset + try_length
/// } catch (T) {    // handler_offset .. handler_offset + handler_length
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Clause flags
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of the try block from the start of the code
    pub try_offset: u32,
    /// Length in bytes of the try block
    pub try_length: u32,
    /// Offset of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Caught type for typed clauses, otherwise the raw filter offset
    pub class_token_or_filter: u32,
}

impl ExceptionHandler {
    /// The clause kind.
    #[must_use]
    pub fn kind(&self) -> ExceptionHandlerKind {
        if self.flags.contains(ExceptionHandlerFlags::FILTER) {
            ExceptionHandlerKind::Filter
        } else if self.flags.contains(ExceptionHandlerFlags::FINALLY) {
            ExceptionHandlerKind::Finally
        } else if self.flags.contains(ExceptionHandlerFlags::FAULT) {
            ExceptionHandlerKind::Fault
        } else {
            ExceptionHandlerKind::Catch
        }
    }

    /// Caught type of a `catch` clause.
    #[must_use]
    pub fn class_token(&self) -> Option<Token> {
        match self.kind() {
            ExceptionHandlerKind::Catch => Some(Token::new(self.class_token_or_filter)),
            _ => None,
        }
    }

    /// Start of the filter block of a `filter` clause.
    #[must_use]
    pub fn filter_offset(&self) -> Option<u32> {
        match self.kind() {
            ExceptionHandlerKind::Filter => Some(self.class_token_or_filter),
            _ => None,
        }
    }

    /// True if `offset` lies inside the protected block.
    #[must_use]
    pub fn covers(&self, offset: u32) -> bool {
        offset >= self.try_offset && offset < self.try_offset + self.try_length
    }

    /// True if `offset` lies inside the handler block.
    #[must_use]
    pub fn in_handler(&self, offset: u32) -> bool {
        offset >= self.handler_offset && offset < self.handler_offset + self.handler_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let mut handler = ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 2,
            try_length: 10,
            handler_offset: 12,
            handler_length: 4,
            class_token_or_filter: 0x0100_0004,
        };
        assert_eq!(handler.kind(), ExceptionHandlerKind::Catch);
        assert_eq!(handler.class_token(), Some(Token::new(0x0100_0004)));
        assert!(handler.covers(2) && handler.covers(11) && !handler.covers(12));
        assert!(handler.in_handler(15) && !handler.in_handler(16));

        handler.flags = ExceptionHandlerFlags::FINALLY;
        assert_eq!(handler.kind(), ExceptionHandlerKind::Finally);
        assert_eq!(handler.class_token(), None);

        handler.flags = ExceptionHandlerFlags::FILTER;
        assert_eq!(handler.filter_offset(), Some(0x0100_0004));
    }
}
