//! # Registry ABI
//!
//! Calldata encoding, return-data and log decoding for the registry
//! contract. Only the handful of types the contract uses are supported:
//! `uint256`, `address`, `bool` and `string`.

use primitive_types::U256;
use sha3::{Digest, Keccak256};
use shared_bus::ContractEvent;
use shared_types::{Address, DocumentRecord, TokenId};

use crate::domain::{ContractCall, RegistryError};

/// `getDocument(uint256)`
pub const GET_DOCUMENT: &str = "getDocument(uint256)";
/// `requestTransfer(uint256,address)`
pub const REQUEST_TRANSFER: &str = "requestTransfer(uint256,address)";
/// `approveTransferAsOwner(uint256)`
pub const APPROVE_AS_OWNER: &str = "approveTransferAsOwner(uint256)";
/// `approveTransferAsGovt(uint256)`
pub const APPROVE_AS_GOVT: &str = "approveTransferAsGovt(uint256)";
/// `uploadDocument(string)`
pub const UPLOAD_DOCUMENT: &str = "uploadDocument(string)";
/// `registerProperty(string,string,uint256,uint256,string)`
pub const REGISTER_PROPERTY: &str = "registerProperty(string,string,uint256,uint256,string)";

/// `DocumentCreated(uint256,string,address)`
pub const DOCUMENT_CREATED: &str = "DocumentCreated(uint256,string,address)";
/// `TransferRequested(uint256,address,address)`
pub const TRANSFER_REQUESTED: &str = "TransferRequested(uint256,address,address)";
/// `OwnerApproved(uint256,address)`
pub const OWNER_APPROVED: &str = "OwnerApproved(uint256,address)";
/// `GovtApproved(uint256,address)`
pub const GOVT_APPROVED: &str = "GovtApproved(uint256,address)";
/// `TransferCompleted(uint256,address,address)`
pub const TRANSFER_COMPLETED: &str = "TransferCompleted(uint256,address,address)";

/// `Error(string)` revert selector.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const WORD: usize = 32;

/// Computes keccak256 hash of data.
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// First four bytes of the signature hash.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `topics[0]` of an event.
#[must_use]
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// Topics of every event the client listens to.
#[must_use]
pub fn registry_topics() -> Vec<[u8; 32]> {
    [
        DOCUMENT_CREATED,
        TRANSFER_REQUESTED,
        OWNER_APPROVED,
        GOVT_APPROVED,
        TRANSFER_COMPLETED,
    ]
    .iter()
    .map(|signature| event_topic(signature))
    .collect()
}

// =============================================================================
// ENCODING
// =============================================================================

enum Token<'a> {
    Uint(U256),
    Address(Address),
    Str(&'a str),
}

impl Token<'_> {
    fn token_id(token_id: TokenId) -> Self {
        Token::Uint(U256::from(token_id.0))
    }
}

/// Calldata for `getDocument(tokenId)`.
#[must_use]
pub fn encode_get_document(token_id: TokenId) -> Vec<u8> {
    encode_function(GET_DOCUMENT, &[Token::token_id(token_id)])
}

/// Calldata for a mutating call.
#[must_use]
pub fn encode_call(call: &ContractCall) -> Vec<u8> {
    match call {
        ContractCall::RequestTransfer {
            token_id,
            recipient,
        } => encode_function(
            REQUEST_TRANSFER,
            &[Token::token_id(*token_id), Token::Address(*recipient)],
        ),
        ContractCall::ApproveAsOwner(token_id) => {
            encode_function(APPROVE_AS_OWNER, &[Token::token_id(*token_id)])
        }
        ContractCall::ApproveAsGovernment(token_id) => {
            encode_function(APPROVE_AS_GOVT, &[Token::token_id(*token_id)])
        }
        ContractCall::UploadDocument { ipfs_hash } => {
            encode_function(UPLOAD_DOCUMENT, &[Token::Str(ipfs_hash)])
        }
        ContractCall::RegisterProperty(details) => encode_function(
            REGISTER_PROPERTY,
            &[
                Token::Str(&details.property_type),
                Token::Str(&details.location),
                Token::Uint(details.area),
                Token::Uint(details.value),
                Token::Str(&details.description),
            ],
        ),
    }
}

fn encode_function(signature: &str, tokens: &[Token<'_>]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode_tokens(tokens));
    out
}

fn encode_tokens(tokens: &[Token<'_>]) -> Vec<u8> {
    let mut head = Vec::with_capacity(tokens.len() * WORD);
    let mut tail = Vec::new();
    let head_len = tokens.len() * WORD;

    for token in tokens {
        match token {
            Token::Uint(value) => head.extend(uint_word(*value)),
            Token::Address(address) => {
                let mut word = [0u8; WORD];
                word[12..].copy_from_slice(&address.0);
                head.extend(word);
            }
            Token::Str(text) => {
                head.extend(uint_word(U256::from(head_len + tail.len())));
                tail.extend(uint_word(U256::from(text.len())));
                tail.extend_from_slice(text.as_bytes());
                let padding = (WORD - text.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
        }
    }

    head.extend(tail);
    head
}

fn uint_word(value: U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    value.to_big_endian(&mut word);
    word
}

// =============================================================================
// DECODING
// =============================================================================

fn decode_error(what: impl Into<String>) -> RegistryError {
    RegistryError::Decode(what.into())
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], RegistryError> {
    data.get(offset..offset + WORD)
        .ok_or_else(|| decode_error(format!("short data: no word at {offset}")))
}

fn read_uint(data: &[u8], offset: usize) -> Result<U256, RegistryError> {
    Ok(U256::from_big_endian(word_at(data, offset)?))
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize, RegistryError> {
    let value = read_uint(data, offset)?;
    if value > U256::from(data.len()) {
        return Err(decode_error(format!("offset {value} out of range")));
    }
    Ok(value.as_usize())
}

fn read_token_id(word: &[u8]) -> Result<TokenId, RegistryError> {
    let value = U256::from_big_endian(word);
    if value > U256::from(u64::MAX) {
        return Err(decode_error(format!("token id {value} exceeds u64")));
    }
    Ok(TokenId(value.as_u64()))
}

fn read_address(word: &[u8]) -> Result<Address, RegistryError> {
    Address::from_slice(&word[12..]).ok_or_else(|| decode_error("bad address word"))
}

fn read_bool(word: &[u8]) -> bool {
    word.iter().any(|byte| *byte != 0)
}

/// Reads a dynamic string whose head word at `head_offset` points into `data`.
fn read_string(data: &[u8], head_offset: usize) -> Result<String, RegistryError> {
    let start = read_usize(data, head_offset)?;
    let len = read_usize(data, start)?;
    let bytes = data
        .get(start + WORD..start + WORD + len)
        .ok_or_else(|| decode_error("string runs past end of data"))?;
    String::from_utf8(bytes.to_vec()).map_err(|err| decode_error(err.to_string()))
}

/// Decode the return data of `getDocument(tokenId)`.
///
/// The contract returns a struct `(string ipfsHash, address owner,
/// address pendingOwner, bool ownerApproved, bool govtApproved)`. Solidity
/// wraps a dynamic struct in an offset word; a plain multi-value return does
/// not. Both layouts are accepted.
pub fn decode_document(token_id: TokenId, data: &[u8]) -> Result<DocumentRecord, RegistryError> {
    let tuple = if read_uint(data, 0)? == U256::from(WORD) {
        &data[WORD..]
    } else {
        data
    };

    Ok(DocumentRecord {
        token_id,
        ipfs_hash: read_string(tuple, 0)?,
        owner: read_address(word_at(tuple, WORD)?)?,
        pending_owner: read_address(word_at(tuple, 2 * WORD)?)?,
        owner_approved: read_bool(word_at(tuple, 3 * WORD)?),
        govt_approved: read_bool(word_at(tuple, 4 * WORD)?),
    })
}

/// Decode an `Error(string)` revert payload.
#[must_use]
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 + 2 * WORD || data[..4] != ERROR_SELECTOR {
        return None;
    }
    read_string(&data[4..], 0).ok()
}

#[derive(Clone, Copy)]
enum Param {
    Uint,
    Address,
    Str,
}

enum Value {
    Uint(TokenId),
    Address(Address),
    Str(String),
}

impl Value {
    fn token_id(&self) -> Result<TokenId, RegistryError> {
        match self {
            Value::Uint(token_id) => Ok(*token_id),
            _ => Err(decode_error("expected uint256")),
        }
    }

    fn address(&self) -> Result<Address, RegistryError> {
        match self {
            Value::Address(address) => Ok(*address),
            _ => Err(decode_error("expected address")),
        }
    }

    fn into_string(self) -> Result<String, RegistryError> {
        match self {
            Value::Str(text) => Ok(text),
            _ => Err(decode_error("expected string")),
        }
    }
}

/// Decode a registry log.
///
/// Indexed parameters are the leading ones and come from `topics[1..]`; the
/// rest are ABI-encoded in `data`. Returns `None` for logs of other events.
pub fn decode_log(
    topics: &[[u8; 32]],
    data: &[u8],
) -> Result<Option<ContractEvent>, RegistryError> {
    let Some(topic0) = topics.first() else {
        return Ok(None);
    };
    let params: &[Param] = match *topic0 {
        t if t == event_topic(DOCUMENT_CREATED) => &[Param::Uint, Param::Str, Param::Address],
        t if t == event_topic(TRANSFER_REQUESTED) || t == event_topic(TRANSFER_COMPLETED) => {
            &[Param::Uint, Param::Address, Param::Address]
        }
        t if t == event_topic(OWNER_APPROVED) || t == event_topic(GOVT_APPROVED) => {
            &[Param::Uint, Param::Address]
        }
        _ => return Ok(None),
    };

    let indexed = topics.len() - 1;
    if indexed > params.len() {
        return Err(decode_error(format!("{indexed} indexed topics, event has {}", params.len())));
    }

    let mut values = Vec::with_capacity(params.len());
    for (param, topic) in params.iter().zip(&topics[1..]) {
        values.push(match param {
            Param::Uint => Value::Uint(read_token_id(topic)?),
            Param::Address => Value::Address(read_address(topic)?),
            Param::Str => return Err(decode_error("indexed string cannot be recovered")),
        });
    }
    for (position, param) in params[indexed..].iter().enumerate() {
        let offset = position * WORD;
        values.push(match param {
            Param::Uint => Value::Uint(read_token_id(word_at(data, offset)?)?),
            Param::Address => Value::Address(read_address(word_at(data, offset)?)?),
            Param::Str => Value::Str(read_string(data, offset)?),
        });
    }

    let mut values = values.into_iter();
    let mut next = || values.next().ok_or_else(|| decode_error("missing log value"));
    let event = match *topic0 {
        t if t == event_topic(DOCUMENT_CREATED) => ContractEvent::DocumentCreated {
            token_id: next()?.token_id()?,
            ipfs_hash: next()?.into_string()?,
            owner: next()?.address()?,
        },
        t if t == event_topic(TRANSFER_REQUESTED) => ContractEvent::TransferRequested {
            token_id: next()?.token_id()?,
            from: next()?.address()?,
            to: next()?.address()?,
        },
        t if t == event_topic(TRANSFER_COMPLETED) => ContractEvent::TransferCompleted {
            token_id: next()?.token_id()?,
            from: next()?.address()?,
            to: next()?.address()?,
        },
        t if t == event_topic(OWNER_APPROVED) => ContractEvent::OwnerApproved {
            token_id: next()?.token_id()?,
            owner: next()?.address()?,
        },
        _ => ContractEvent::GovtApproved {
            token_id: next()?.token_id()?,
            govt: next()?.address()?,
        },
    };
    Ok(Some(event))
}
