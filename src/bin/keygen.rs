// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Create (or load) an oracle signer key and print its public key and address.
//!
//! Usage: `omnisupply-keygen [data_dir]`. Set `OMNISUPPLY_KEY_PASSPHRASE` to
//! encrypt the key at rest.

use anyhow::{Context, Result};
use omnisupply::core::security::keystore::{Keystore, KEY_FILE_NAME};
use std::path::PathBuf;

fn main() -> Result<()> {
    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "data".to_string()));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let ks = Keystore::open(&out_dir).context("opening signer key")?;
    eprintln!("key: {}", out_dir.join(KEY_FILE_NAME).display());
    println!("public_key = \"{}\"", hex::encode(ks.public_key()));
    println!("address = \"{}\"", ks.address());
    Ok(())
}
