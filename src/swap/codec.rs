use std::ops::Range;
use std::str::FromStr;

use crate::registry::{Network, Registry, Token};

/// Length of an encoded swap, `0x` prefix included.
pub const ENCODED_LEN: usize = 66;

/// In-token index reserved for the universal credit token.
pub const UCT_TOKEN_INDEX: u8 = 255;

const VERSION: Range<usize> = 2..4;
const AMOUNT: Range<usize> = 4..14;
const SALT_HEADER: Range<usize> = 14..18;
const SALT_DATA: Range<usize> = 18..34;
const FEE: Range<usize> = 34..44;
const EXPIRE_TS: Range<usize> = 44..54;
const OUT_CHAIN: Range<usize> = 54..58;
const OUT_TOKEN: Range<usize> = 58..60;
const IN_CHAIN: Range<usize> = 60..64;
const IN_TOKEN: Range<usize> = 64..66;

const SPLIT_POS_LEGACY: usize = 22;
const SPLIT_POS_CORE_TOKEN: usize = 23;
const SEGMENT_END: usize = 26;

const MAX_U40: u64 = (1 << 40) - 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("encoded swap too short: {len} chars, need at least {min}")]
    TooShort { len: usize, min: usize },
    #[error("invalid hex in {field}")]
    InvalidHex { field: &'static str },
    #[error("unknown chain {chain:#06x}")]
    UnknownChain { chain: u16 },
    #[error("unknown token {index} on chain {chain:#06x}")]
    UnknownToken { chain: u16, index: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("{field} does not fit in 40 bits: {value}")]
    Overflow { field: &'static str, value: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Version 0: `amount` excludes the fee, which is added on the input side.
    Legacy,
    Standard,
    /// Salt data carries a core-token price and sub-amount.
    CoreToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Api,
    WebApp,
    AllsTo,
    Unspecified,
}

/// Ten salt bytes: a two-byte flag header followed by eight data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Salt {
    pub header: u16,
    pub data: u64,
}

impl Salt {
    /// Header nibble `i` (0..4), most significant first.
    pub fn nibble(&self, i: usize) -> u8 {
        debug_assert!(i < 4);
        ((self.header >> (12 - 4 * i)) & 0xf) as u8
    }

    pub fn fee_waived(&self) -> bool {
        self.nibble(0) & 0x4 != 0
    }

    pub fn channel(&self) -> Channel {
        match self.nibble(0) & 0xb {
            0x9 => Channel::Api,
            0x2 => Channel::WebApp,
            0xa => Channel::AllsTo,
            _ => Channel::Unspecified,
        }
    }

    pub fn to_contract(&self) -> bool {
        let h0 = self.nibble(0);
        h0 & 0x8 == 0 && h0 & 0x2 != 0
    }

    pub fn non_typed_signing(&self) -> bool {
        self.nibble(1) & 0x8 != 0
    }

    pub fn swap_for_core_token(&self) -> bool {
        self.nibble(1) & 0x4 != 0
    }

    pub fn event_qualification(&self) -> u8 {
        self.nibble(2)
    }

    pub fn is_event_qualified(&self) -> bool {
        self.event_qualification() >= 8
    }

    /// Salt data chars `[start, end)` in full-string offsets, as an integer.
    fn data_chars(&self, range: Range<usize>) -> u64 {
        let width = range.end - range.start;
        let shift = 4 * (SALT_DATA.end - range.end);
        (self.data >> shift) & ((1u64 << (4 * width)) - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreTokenSwap {
    /// Part of `amount` converted to the destination chain's core token, 6 dp.
    pub amount_for_core_token: u64,
    /// Price of the core token in cents.
    pub core_token_price: u64,
    /// Core token delivered, 6 dp.
    pub core_token_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapDescriptor {
    pub version: u8,
    pub amount: u64,
    pub salt: Salt,
    pub fee: u64,
    pub expire_ts: u64,
    pub out_chain: u16,
    pub out_token: u8,
    pub in_chain: u16,
    pub in_token: u8,
    /// Hex digits after the fixed layout, kept as written.
    pub trailer: String,
}

impl SwapDescriptor {
    pub fn decode(encoded: &str) -> Result<Self, DecodeError> {
        if encoded.len() < ENCODED_LEN {
            return Err(DecodeError::TooShort {
                len: encoded.len(),
                min: ENCODED_LEN,
            });
        }
        if !matches!(encoded.get(0..2), Some("0x" | "0X")) {
            return Err(DecodeError::InvalidHex { field: "version" });
        }

        let trailer = match encoded.get(ENCODED_LEN..) {
            Some(rest) if rest.bytes().all(|b| b.is_ascii_hexdigit()) => rest.to_string(),
            _ => return Err(DecodeError::InvalidHex { field: "trailer" }),
        };

        Ok(Self {
            version: field(encoded, VERSION, "version")? as u8,
            amount: field(encoded, AMOUNT, "amount")?,
            salt: Salt {
                header: field(encoded, SALT_HEADER, "salt header")? as u16,
                data: field(encoded, SALT_DATA, "salt data")?,
            },
            fee: field(encoded, FEE, "fee")?,
            expire_ts: field(encoded, EXPIRE_TS, "expire ts")?,
            out_chain: field(encoded, OUT_CHAIN, "out chain")? as u16,
            out_token: field(encoded, OUT_TOKEN, "out token")? as u8,
            in_chain: field(encoded, IN_CHAIN, "in chain")? as u16,
            in_token: field(encoded, IN_TOKEN, "in token")? as u8,
            trailer,
        })
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        for (name, value) in [
            ("amount", self.amount),
            ("fee", self.fee),
            ("expire ts", self.expire_ts),
        ] {
            if value > MAX_U40 {
                return Err(EncodeError::Overflow { field: name, value });
            }
        }

        Ok(format!(
            "0x{:02x}{:010x}{:04x}{:016x}{:010x}{:010x}{:04x}{:02x}{:04x}{:02x}{}",
            self.version,
            self.amount,
            self.salt.header,
            self.salt.data,
            self.fee,
            self.expire_ts,
            self.out_chain,
            self.out_token,
            self.in_chain,
            self.in_token,
            self.trailer,
        ))
    }

    pub fn encoding(&self) -> Encoding {
        if self.version == 0 {
            Encoding::Legacy
        } else if self.is_new_format() {
            Encoding::CoreToken
        } else {
            Encoding::Standard
        }
    }

    pub fn is_new_format(&self) -> bool {
        self.version >= 2 && self.salt.swap_for_core_token()
    }

    /// Offset in the encoded string where the salt data's second segment starts.
    pub fn split_position(&self) -> usize {
        if self.is_new_format() {
            SPLIT_POS_CORE_TOKEN
        } else {
            SPLIT_POS_LEGACY
        }
    }

    pub fn core_token(&self) -> Option<CoreTokenSwap> {
        if !self.is_new_format() {
            return None;
        }
        let split = self.split_position();
        let core_token_price = self.salt.data_chars(SALT_DATA.start..split);
        let amount_for_core_token = self.salt.data_chars(split..SEGMENT_END) * 100_000;
        let core_token_amount = if core_token_price == 0 {
            0
        } else {
            ((amount_for_core_token as u128 * 100) / core_token_price as u128) as u64
        };
        Some(CoreTokenSwap {
            amount_for_core_token,
            core_token_price,
            core_token_amount,
        })
    }

    /// Raw second salt-data segment of a non-core-token swap; it carries the share fee.
    pub fn share_segment(&self) -> Option<u64> {
        if self.is_new_format() {
            return None;
        }
        Some(self.salt.data_chars(self.split_position()..SEGMENT_END))
    }

    pub fn is_uct(&self) -> bool {
        self.in_token == UCT_TOKEN_INDEX
    }

    pub fn in_decimals(&self) -> u32 {
        if self.is_uct() { 4 } else { 6 }
    }

    pub fn will_waive_fee(&self) -> bool {
        self.salt.fee_waived()
    }

    pub fn service_fee(&self) -> u64 {
        if self.will_waive_fee() {
            0
        } else {
            self.amount / 1000
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expire_ts < now
    }

    pub fn amount_without_core_token(&self) -> u64 {
        let core = self.core_token().map_or(0, |c| c.amount_for_core_token);
        self.amount.checked_sub(core).unwrap_or(self.amount)
    }

    pub fn in_amount(&self) -> u64 {
        match self.encoding() {
            Encoding::Legacy => self.amount.saturating_add(self.fee),
            _ => self.amount_without_core_token(),
        }
    }

    /// `None` when the fees exceed what the swap carries.
    pub fn out_amount(&self) -> Option<u64> {
        match self.encoding() {
            Encoding::Legacy => Some(self.amount),
            _ => self
                .amount_without_core_token()
                .checked_sub(self.service_fee())?
                .checked_sub(self.fee),
        }
    }
}

impl FromStr for SwapDescriptor {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub network: Network,
    pub token: Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSwap {
    pub descriptor: SwapDescriptor,
    pub from: Endpoint,
    pub to: Endpoint,
}

pub fn decode(encoded: &str, registry: &impl Registry) -> Result<ResolvedSwap, DecodeError> {
    let descriptor = SwapDescriptor::decode(encoded)?;
    let from = resolve(registry, descriptor.in_chain, descriptor.in_token)?;
    let to = resolve(registry, descriptor.out_chain, descriptor.out_token)?;
    Ok(ResolvedSwap {
        descriptor,
        from,
        to,
    })
}

fn resolve(registry: &impl Registry, chain: u16, index: u8) -> Result<Endpoint, DecodeError> {
    let network = registry
        .resolve_chain(chain)
        .ok_or(DecodeError::UnknownChain { chain })?;
    let token = registry
        .resolve_token(chain, index)
        .ok_or(DecodeError::UnknownToken { chain, index })?;
    Ok(Endpoint {
        network: network.clone(),
        token: token.clone(),
    })
}

fn field(encoded: &str, range: Range<usize>, name: &'static str) -> Result<u64, DecodeError> {
    let chunk = encoded
        .get(range)
        .ok_or(DecodeError::InvalidHex { field: name })?;
    let bytes = hex::decode(chunk).map_err(|_| DecodeError::InvalidHex { field: name })?;
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}
