//!
//! Tryte encoding helpers for ledger identifiers and raw transactions.
//!
//! Addresses, hashes and raw transactions travel as tryte strings over the alphabet
//! `9ABCDEFGHIJKLMNOPQRSTUVWXYZ`. Each tryte is a balanced base-27 digit in `-13..=13`,
//! least significant digit first. Raw transactions use a fixed field layout.

use thiserror::Error;

use super::types::Transaction;

pub const TRYTE_ALPHABET: &[u8; 27] = b"9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of an address or transaction/bundle hash without checksum.
pub const HASH_LENGTH: usize = 81;
/// Length of an address carrying its 9-tryte checksum.
pub const ADDRESS_WITH_CHECKSUM_LENGTH: usize = 90;
/// Length of one raw transaction.
pub const TRANSACTION_LENGTH: usize = 2673;
pub const MESSAGE_LENGTH: usize = 2187;
pub const TAG_LENGTH: usize = 27;

const ADDRESS_OFFSET: usize = 2187;
const VALUE_OFFSET: usize = 2268;
const VALUE_LENGTH: usize = 27;
const CURRENT_INDEX_OFFSET: usize = 2331;
const LAST_INDEX_OFFSET: usize = 2340;
const INDEX_LENGTH: usize = 9;
const BUNDLE_OFFSET: usize = 2349;
const TRUNK_OFFSET: usize = 2430;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TryteError {
	#[error("invalid tryte character {0:?}")]
	InvalidCharacter(char),
	#[error("expected {expected} trytes, got {actual}")]
	InvalidLength { expected: usize, actual: usize },
	#[error("value {0} does not fit in {1} trytes")]
	Overflow(i64, usize),
	#[error("tryte integer out of range")]
	OutOfRange,
}

/// Balanced value of a single tryte character.
pub fn tryte_value(c: char) -> Result<i64, TryteError> {
	match c {
		'9' => Ok(0),
		'A'..='M' => Ok(c as i64 - 'A' as i64 + 1),
		'N'..='Z' => Ok(c as i64 - 'N' as i64 - 13),
		_ => Err(TryteError::InvalidCharacter(c)),
	}
}

fn tryte_char(digit: i64) -> char {
	let position = if digit < 0 { 27 + digit } else { digit };
	TRYTE_ALPHABET[position as usize] as char
}

pub fn is_trytes(value: &str) -> bool {
	value.bytes().all(|b| TRYTE_ALPHABET.contains(&b))
}

/// A bundle or transaction hash: exactly 81 trytes.
pub fn is_hash(value: &str) -> bool {
	value.len() == HASH_LENGTH && is_trytes(value)
}

/// An address with or without its checksum.
pub fn is_address(value: &str) -> bool {
	(value.len() == HASH_LENGTH || value.len() == ADDRESS_WITH_CHECKSUM_LENGTH) && is_trytes(value)
}

/// Strips the checksum from an address, if present. Anything that is not a checksummed
/// address comes back unchanged.
pub fn no_checksum(address: &str) -> &str {
	if address.len() == ADDRESS_WITH_CHECKSUM_LENGTH && is_trytes(address) {
		&address[..HASH_LENGTH]
	} else {
		address
	}
}

/// Decodes a balanced base-27 integer, least significant tryte first.
pub fn trytes_to_int(trytes: &str) -> Result<i64, TryteError> {
	let mut acc: i128 = 0;
	for c in trytes.chars().rev() {
		let digit = tryte_value(c)? as i128;
		acc = acc
			.checked_mul(27)
			.and_then(|v| v.checked_add(digit))
			.ok_or(TryteError::OutOfRange)?;
	}
	i64::try_from(acc).map_err(|_| TryteError::OutOfRange)
}

/// Encodes an integer into exactly `length` trytes.
pub fn int_to_trytes(value: i64, length: usize) -> Result<String, TryteError> {
	let mut remaining = value as i128;
	let mut out = String::with_capacity(length);
	for _ in 0..length {
		let mut digit = remaining.rem_euclid(27);
		if digit > 13 {
			digit -= 27;
		}
		remaining = (remaining - digit) / 27;
		out.push(tryte_char(digit as i64));
	}
	if remaining != 0 {
		return Err(TryteError::Overflow(value, length));
	}
	Ok(out)
}

fn field(trytes: &str, offset: usize, length: usize) -> &str {
	&trytes[offset..offset + length]
}

fn index_field(trytes: &str, offset: usize) -> Result<u64, TryteError> {
	let value = trytes_to_int(field(trytes, offset, INDEX_LENGTH))?;
	u64::try_from(value).map_err(|_| TryteError::OutOfRange)
}

/// Decodes a raw transaction. The hash is not part of the trytes and must be supplied.
pub fn decode_transaction(hash: &str, trytes: &str) -> Result<Transaction, TryteError> {
	if trytes.len() != TRANSACTION_LENGTH {
		return Err(TryteError::InvalidLength {
			expected: TRANSACTION_LENGTH,
			actual: trytes.len(),
		});
	}
	if let Some(c) = trytes
		.chars()
		.find(|c| !c.is_ascii() || !TRYTE_ALPHABET.contains(&(*c as u8)))
	{
		return Err(TryteError::InvalidCharacter(c));
	}

	Ok(Transaction {
		hash: hash.to_string(),
		address: field(trytes, ADDRESS_OFFSET, HASH_LENGTH).to_string(),
		value: trytes_to_int(field(trytes, VALUE_OFFSET, VALUE_LENGTH))?,
		current_index: index_field(trytes, CURRENT_INDEX_OFFSET)?,
		last_index: index_field(trytes, LAST_INDEX_OFFSET)?,
		bundle: field(trytes, BUNDLE_OFFSET, HASH_LENGTH).to_string(),
		trunk_transaction: field(trytes, TRUNK_OFFSET, HASH_LENGTH).to_string(),
	})
}
