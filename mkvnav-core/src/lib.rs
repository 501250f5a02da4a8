// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared building blocks of the mkvnav Matroska engine: the error type, the diagnostics
//! collector, cancellation and the byte-stream I/O layer.

pub mod abort;
pub mod errors;
pub mod io;
pub mod util;
