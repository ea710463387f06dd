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
#![deny(missing_docs)]

//! Burn-and-mint transfer payload.
//!
//! Wire layout (big-endian, fixed framing):
//!
//! ```text
//! version(1) || origin_chain(8) || destination_chain(8) || nonce(8)
//!   || sender_len(1) || sender(20) || recipient_len(1) || recipient(20) || amount(16)
//! ```
//!
//! Address length prefixes must be exactly 20. Anything else, including a
//! 32-byte padded form, is rejected instead of being coerced to some address.

use crate::core::types::{Address, Amount, ChainId, CodecError, ProtocolId, H256};

/// Current payload version.
pub const MESSAGE_VERSION: u8 = 1;
/// Exact encoded length of a version-1 payload.
pub const MESSAGE_LEN: usize = 1 + 8 + 8 + 8 + 1 + 20 + 1 + 20 + 16;

const TRANSFER_ID_DOMAIN: &[u8] = b"Omnisupply-Transfer-v1";

/// Decoded transfer instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferMessage {
    /// Chain where the amount was burned.
    pub origin_chain: ChainId,
    /// Chain that must mint.
    pub destination_chain: ChainId,
    /// Source adapter's outbound nonce.
    pub nonce: u64,
    /// Account whose tokens were burned.
    pub sender: Address,
    /// Account to mint to.
    pub recipient: Address,
    /// Amount in base units.
    pub amount: Amount,
}

impl TransferMessage {
    /// Encode to the fixed wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MESSAGE_LEN);
        out.push(MESSAGE_VERSION);
        out.extend_from_slice(&self.origin_chain.to_be_bytes());
        out.extend_from_slice(&self.destination_chain.to_be_bytes());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.push(20);
        out.extend_from_slice(&self.sender.0);
        out.push(20);
        out.extend_from_slice(&self.recipient.0);
        out.extend_from_slice(&self.amount.to_be_bytes());
        out
    }

    /// Strict decode; rejects wrong versions, address lengths and trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader { buf: bytes, pos: 0 };
        let version = r.u8()?;
        if version != MESSAGE_VERSION {
            return Err(CodecError::Version(version));
        }
        let origin_chain = u64::from_be_bytes(r.array()?);
        let destination_chain = u64::from_be_bytes(r.array()?);
        let nonce = u64::from_be_bytes(r.array()?);
        let sender = r.address()?;
        let recipient = r.address()?;
        let amount = u128::from_be_bytes(r.array()?);
        if r.pos != bytes.len() {
            return Err(CodecError::Deserialize);
        }
        Ok(Self { origin_chain, destination_chain, nonce, sender, recipient, amount })
    }

    /// Stable identifier of this transfer over `protocol`.
    pub fn transfer_id(&self, protocol: ProtocolId) -> H256 {
        let payload = self.encode();
        let mut buf = Vec::with_capacity(TRANSFER_ID_DOMAIN.len() + 1 + payload.len());
        buf.extend_from_slice(TRANSFER_ID_DOMAIN);
        buf.push(protocol.tag());
        buf.extend_from_slice(&payload);
        H256::digest(&buf)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Deserialize)?;
        let s = self.buf.get(self.pos..end).ok_or(CodecError::Deserialize)?;
        self.pos = end;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn address(&mut self) -> Result<Address, CodecError> {
        let len = self.u8()? as usize;
        if len != 20 {
            return Err(CodecError::AddressLength(len));
        }
        Address::from_slice(self.take(len)?)
    }
}
