// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client-side agent for a server-mediated collaborative plain-text editing
//! protocol: a wire codec and line splitter, the operational-transform
//! algebra, the `BreakTree` document structure, the reconnecting transport,
//! and the `Client` that ties them to a host editor.

pub mod client;
pub mod codec;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;
pub mod ot;
pub mod splitter;
pub mod transport;
pub mod tree;
pub mod wire;
