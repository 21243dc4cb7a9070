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

//! Method bodies (ECMA-335 II.25.4): headers, exception sections and method flags.

mod body;
mod exceptions;
mod types;

pub use body::{MethodBody, MethodBodyEncoder};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags, ExceptionHandlerKind};
pub use types::*;
