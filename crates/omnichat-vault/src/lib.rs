// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM credential vault for the omnichannel chat core.
//!
//! Every secret column of `channel_credentials` passes through this crate:
//! values are sealed with a process-wide 32-byte key (configured directly or
//! derived from a passphrase via Argon2id) and stored as
//! `base64(nonce || ciphertext)`. The vault is the only writer of credential
//! rows and announces every change on a broadcast channel.

pub mod crypto;
pub mod kdf;
pub mod vault;

pub use vault::{CredentialEvent, CredentialPatch, CredentialView, Vault, mask_secret};
