//! A minimal transparent transaction representation.
//!
//! Script execution and signature verification are explicit Non-goals
//! (§1): scripts are carried as opaque bytes, never interpreted. What this
//! module needs to support is exactly what the block validator touches —
//! coinbase detection, output value summation, lock time, and (for the
//! coinbase) BIP-34 height extraction.

use std::io::{Read, Write};

use crate::{
    hash::Hash,
    serialization::{read_compact_size, write_compact_size, SerializationError},
};

/// A reference to a previous transaction's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

/// A transaction input.
///
/// The coinbase input is distinguished by an all-zero `OutPoint` hash and
/// `0xffff_ffff` index, matching Bitcoin wire convention; `script_sig`
/// carries the BIP-34 height-encoding bytes for coinbase inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxInput {
    pub fn is_coinbase(&self) -> bool {
        self.previous_output.hash.is_zero() && self.previous_output.index == u32::MAX
    }
}

/// A transaction output: a value and an opaque locking script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// A transparent Bitcoin-style transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// A transaction is a coinbase iff it has exactly one input, and that
    /// input is the coinbase input (§4.6 check 4).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// The sum of this transaction's output values.
    pub fn output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Extracts the BIP-34 block height from a coinbase's `script_sig`.
    ///
    /// BIP-34 encodes the height as a script push: the first byte gives the
    /// number of little-endian height bytes that follow. Returns `None` if
    /// `script_sig` doesn't start with a plausible push, which the caller
    /// treats as a validation failure for version >= 2 blocks past the
    /// activation height (§3 Block invariant (b), §4.6 check 5).
    pub fn extract_coinbase_height(&self) -> Option<u32> {
        if !self.is_coinbase() {
            return None;
        }
        let script = &self.inputs[0].script_sig;
        let push_len = *script.first()? as usize;
        if push_len == 0 || push_len > 4 || script.len() < 1 + push_len {
            return None;
        }
        let mut bytes = [0u8; 4];
        bytes[..push_len].copy_from_slice(&script[1..1 + push_len]);
        Some(u32::from_le_bytes(bytes))
    }

    pub fn id(&self) -> Hash {
        let mut bytes = Vec::new();
        self.write(&mut bytes).expect("writing to a Vec never fails");
        Hash::hash(&bytes)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        writer.write_all(&self.version.to_le_bytes())?;
        write_compact_size(&mut writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.previous_output.hash.write(&mut writer)?;
            writer.write_all(&input.previous_output.index.to_le_bytes())?;
            write_compact_size(&mut writer, input.script_sig.len() as u64)?;
            writer.write_all(&input.script_sig)?;
            writer.write_all(&input.sequence.to_le_bytes())?;
        }
        write_compact_size(&mut writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            writer.write_all(&output.value.to_le_bytes())?;
            write_compact_size(&mut writer, output.script_pubkey.len() as u64)?;
            writer.write_all(&output.script_pubkey)?;
        }
        writer.write_all(&self.lock_time.to_le_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut version_bytes = [0u8; 4];
        reader.read_exact(&mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);

        let input_count = read_compact_size(&mut reader)?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let hash = Hash::read(&mut reader)?;
            let mut index_bytes = [0u8; 4];
            reader.read_exact(&mut index_bytes)?;
            let script_len = read_compact_size(&mut reader)?;
            let mut script_sig = vec![0u8; script_len as usize];
            reader.read_exact(&mut script_sig)?;
            let mut sequence_bytes = [0u8; 4];
            reader.read_exact(&mut sequence_bytes)?;
            inputs.push(TxInput {
                previous_output: OutPoint { hash, index: u32::from_le_bytes(index_bytes) },
                script_sig,
                sequence: u32::from_le_bytes(sequence_bytes),
            });
        }

        let output_count = read_compact_size(&mut reader)?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            let mut value_bytes = [0u8; 8];
            reader.read_exact(&mut value_bytes)?;
            let script_len = read_compact_size(&mut reader)?;
            let mut script_pubkey = vec![0u8; script_len as usize];
            reader.read_exact(&mut script_pubkey)?;
            outputs.push(TxOutput { value: u64::from_le_bytes(value_bytes), script_pubkey });
        }

        let mut lock_time_bytes = [0u8; 4];
        reader.read_exact(&mut lock_time_bytes)?;

        Ok(Transaction { version, inputs, outputs, lock_time: u32::from_le_bytes(lock_time_bytes) })
    }

    /// Builds a coinbase transaction, BIP-34-encoding `height` into the
    /// input script when `version >= 2`.
    pub fn new_coinbase(version: u32, height: u32, outputs: Vec<TxOutput>) -> Self {
        let script_sig = if version >= 2 {
            let height_bytes = height.to_le_bytes();
            let push_len = if height == 0 { 1 } else { 4 - height_bytes.iter().rev().take_while(|b| **b == 0).count() };
            let push_len = push_len.max(1);
            let mut script = vec![push_len as u8];
            script.extend_from_slice(&height_bytes[..push_len]);
            script
        } else {
            Vec::new()
        };

        Transaction {
            version,
            inputs: vec![TxInput {
                previous_output: OutPoint { hash: Hash::ZERO, index: u32::MAX },
                script_sig,
                sequence: u32::MAX,
            }],
            outputs,
            lock_time: 0,
        }
    }
}
