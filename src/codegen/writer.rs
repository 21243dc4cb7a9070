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


//! Indentation aware text buffer for generated sources.

use std::fmt::Write;

const INDENT: &str = "    ";

/// C++ narrow string literal holding the UTF-8 encoding of `text`.
///
/// Non-ASCII bytes are written as octal escapes, which unlike hex escapes never absorb the
/// following character.
pub(crate) fn cpp_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for byte in text.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'?' => out.push_str("\\?"),
            0x20..=0x7E => out.push(char::from(byte)),
            other => {
                let _ = write!(out, "\\{other:03o}");
            }
        }
    }
    out.push('"');
    out
}

/// Accumulates lines of C++ source.
#[derive(Debug, Default)]
pub(crate) struct CodeWriter {
    out: String,
    depth: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        CodeWriter::default()
    }

    /// Writes one line at the current indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    /// Writes one line at column zero, for labels and preprocessor directives.
    pub fn flush_left(&mut self, text: impl AsRef<str>) {
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Writes `text` and indents the following lines.
    pub fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    /// Unindents and writes `text`.
    pub fn close(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    /// Unindents, writes `text` and indents again, for `} else {` and macro separators.
    pub fn reopen(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
        self.depth += 1;
    }

    /// Appends already formatted source.
    pub fn append(&mut self, source: &str) {
        self.out.push_str(source);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indentation() {
        let mut writer = CodeWriter::new();
        writer.open("void f() {");
        writer.flush_left("L0:");
        writer.line("return;");
        writer.close("}");
        assert_eq!(writer.finish(), "void f() {\nL0:\n    return;\n}\n");
    }

    #[test]
    fn string_literals() {
        assert_eq!(cpp_string("a\"b"), r#""a\"b""#);
        assert_eq!(cpp_string("line\n"), r#""line\n""#);
        assert_eq!(cpp_string("\u{e9}1"), r#""\303\2511""#);
        assert_eq!(cpp_string("??="), r#""\?\?=""#);
    }
}
