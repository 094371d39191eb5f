// Copyright 2024 polynet contributors.
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

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms, unused_imports)]
#![doc(test(attr(deny(warnings))))]

//! `polynet` is a multi-protocol network application server core: a
//! reactor of epoll threads, a connection pipeline, a byte-sniffing
//! protocol detector, an HTTP/2 engine with its own HPACK codec, and a TLS
//! codec layered transparently underneath all of them.
//!
//! A [`server::Server`] owns a listen thread and a pool of worker threads,
//! each running its own epoll loop over a [`container::Container`] of
//! [`connection::Connection`]s. A connection starts out wearing a
//! [`processor::detector::Detector`] as its active
//! [`processor::Processor`]; once the detector recognizes the protocol on
//! the wire it swaps itself for the matching processor (HTTP/1.1,
//! WebSocket, HTTP/2, or a length-prefixed binary stream) without the
//! connection itself ever needing to know which one is running.
//!
//! Application code plugs in through [`handler::Handler`] (or, for the
//! async-response facility, the Level 2 `*Context` types alongside it) and
//! a [`server::Factory`] that supplies it.

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod container;
pub mod error;
pub mod h2;
pub mod handler;
pub mod hpack;
pub mod listener;
pub mod net;
pub mod parser;
pub mod processor;
pub mod reactor;
pub mod server;
pub mod timer;
pub mod tls;
pub mod worker;

pub use config::Config;
pub use error::{CoreError, ErrorKind};
pub use handler::Handler;
pub use server::{Factory, HandlerFactory, Server, ServerBuilder};
