// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep a Claude configuration directory mirrored against a remote Git
//! repository, so the same configuration can be reproduced on every machine.
//!
//! # Overview
//!
//! - [`path`] finds the configuration root and the mirror root.
//! - [`mapping`] lists exactly which paths get synchronized.
//! - [`mirror::compare`] decides what is in sync.
//! - [`mirror::transfer`] adopts local edits into the mirror, or applies the
//!   mirror back onto the configuration root.
//! - [`mirror::gateway`] wraps every Git operation behind a small trait.
//! - [`store`] persists the mirror's metadata record.
//! - [`mirror::Mirror`] sequences all of the above into init, push, pull,
//!   and status.

pub mod config;
pub mod mapping;
pub mod mirror;
pub mod path;
pub mod store;

pub use config::Metadata;
pub use mapping::{Mapping, MappingKind, MAPPINGS};
pub use mirror::{
    compare::{compare, Comparison},
    gateway::{Git2Gateway, RepoGateway},
    transfer::{adopt, apply, SyncAction, SyncResult},
    Mirror, MirrorError,
};
pub use path::{Environment, Layout};
pub use store::MetadataStore;
