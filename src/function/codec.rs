//! Versioned little-endian byte format for [`Function`].
//!
//! ```text
//! magic "ADTP" | version u16 | width u8 | reserved u8
//! num_independent u32 | num_nodes u32
//! constants: u32 count, scalars
//! vectors:   u32 count, each u32 len + scalars
//! atomics:   u32 count, each u32 byte len + UTF-8 name
//! nodes:     tag u8, payload u8, argc u32, argc × u32
//! dependents: u32 count, encoded operands
//! ```

use std::io;
use std::sync::Arc;

use tracing::debug;

use crate::atomic::AtomicOp;
use crate::error::{AdError, Result};
use crate::float::Float;
use crate::opcode::OpCode;
use crate::tape::{OperationLog, TapeId};

use super::Function;

/// First four bytes of every encoded tape.
pub const MAGIC: [u8; 4] = *b"ADTP";

/// Version written by [`Function::to_bytes`]; the only one decoding accepts.
pub const FORMAT_VERSION: u16 = 1;

impl<F: Float> Function<F> {
    /// Encode to the binary tape format.
    ///
    /// Atomic operations are stored by name; decode with
    /// [`from_bytes_with_atomics`](Self::from_bytes_with_atomics).
    /// [`FunctionOptions`](super::FunctionOptions) are not encoded.
    pub fn to_bytes(&self) -> Vec<u8> {
        let log = &self.log;
        let mut out = Vec::with_capacity(
            24 + log.constants.len() * F::WIDTH as usize + log.args.len() * 4 + log.ops.len() * 6,
        );
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.push(F::WIDTH);
        out.push(0);
        put_u32(&mut out, log.num_independent);
        put_len(&mut out, log.ops.len());

        put_len(&mut out, log.constants.len());
        for &c in &log.constants {
            c.write_le(&mut out);
        }

        put_len(&mut out, log.vectors.len());
        for v in &log.vectors {
            put_len(&mut out, v.len());
            for &x in v {
                x.write_le(&mut out);
            }
        }

        put_len(&mut out, log.atomics.len());
        for atom in &log.atomics {
            let name = atom.name().as_bytes();
            put_len(&mut out, name.len());
            out.extend_from_slice(name);
        }

        for (i, &op) in log.ops.iter().enumerate() {
            let args = log.node_args(i);
            out.push(op.tag());
            out.push(op.payload());
            put_len(&mut out, args.len());
            for &a in args {
                put_u32(&mut out, a);
            }
        }

        put_len(&mut out, self.dependents.len());
        for &d in &self.dependents {
            put_u32(&mut out, d);
        }

        debug!(
            bytes = out.len(),
            nodes = log.ops.len(),
            "encoded tape"
        );
        out
    }

    /// Decode a tape that calls no atomic operations.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_atomics(bytes, &[])
    }

    /// Decode a tape, resolving atomic operation names against `registry`.
    ///
    /// The decoded function gets a fresh [`TapeId`] and default options.
    pub fn from_bytes_with_atomics(bytes: &[u8], registry: &[Arc<dyn AtomicOp<F>>]) -> Result<Self> {
        let mut r = Reader::new(bytes);

        let magic = r.take(4)?;
        if magic != MAGIC {
            return Err(AdError::MalformedTape(format!("bad magic {magic:02x?}")));
        }
        let version = r.u16()?;
        if version != FORMAT_VERSION {
            return Err(AdError::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        let width = r.u8()?;
        if width != F::WIDTH {
            return Err(AdError::MalformedTape(format!(
                "scalar width {width} does not match the requested float type ({})",
                F::WIDTH
            )));
        }
        let _reserved = r.u8()?;
        let num_independent = r.u32()?;
        let num_nodes = r.len(6)?;

        let mut log = OperationLog::new(TapeId::fresh());
        log.num_independent = num_independent;

        let nconst = r.len(F::WIDTH as usize)?;
        log.constants.reserve(nconst);
        for _ in 0..nconst {
            log.constants.push(r.scalar::<F>()?);
        }

        let nvec = r.len(4)?;
        for _ in 0..nvec {
            let len = r.len(F::WIDTH as usize)?;
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(r.scalar::<F>()?);
            }
            log.vectors.push(v);
        }

        let natom = r.len(4)?;
        for _ in 0..natom {
            let len = r.len(1)?;
            let raw = r.take(len)?;
            let name = std::str::from_utf8(raw)
                .map_err(|e| AdError::MalformedTape(format!("atomic name is not UTF-8: {e}")))?;
            let atom = registry
                .iter()
                .find(|a| a.name() == name)
                .ok_or_else(|| AdError::UnknownAtomic(name.to_owned()))?;
            log.atomics.push(Arc::clone(atom));
        }

        log.ops.reserve(num_nodes);
        log.arg_offsets.reserve(num_nodes);
        for node in 0..num_nodes {
            let tag = r.u8()?;
            let payload = r.u8()?;
            let op = OpCode::from_tag(tag, payload).ok_or(AdError::UnknownOpcode { tag, node })?;
            let argc = r.len(4)?;
            for _ in 0..argc {
                log.args.push(r.u32()?);
            }
            log.close_node(op);
        }

        let ndep = r.len(4)?;
        let mut dependents = Vec::with_capacity(ndep);
        for _ in 0..ndep {
            dependents.push(r.u32()?);
        }

        if r.remaining() > 0 {
            return Err(AdError::MalformedTape(format!(
                "{} trailing bytes after the dependents",
                r.remaining()
            )));
        }

        let f = Function::from_validated(log, dependents)?;
        debug!(
            bytes = bytes.len(),
            nodes = f.num_nodes(),
            "decoded tape"
        );
        Ok(f)
    }

    /// Write the encoded tape to `writer`.
    pub fn write_to<W: io::Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Read an encoded tape from `reader` until end of stream.
    pub fn read_from<R: io::Read>(reader: R) -> Result<Self> {
        Self::read_from_with_atomics(reader, &[])
    }

    /// [`read_from`](Self::read_from) with an atomic registry.
    pub fn read_from_with_atomics<R: io::Read>(
        mut reader: R,
        registry: &[Arc<dyn AtomicOp<F>>],
    ) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes_with_atomics(&bytes, registry)
    }
}

#[inline]
fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[inline]
fn put_len(out: &mut Vec<u8>, len: usize) {
    // Node and pool sizes are bounded by the u32 operand encoding.
    put_u32(out, len as u32);
}

/// Bounds-checked cursor over an encoded tape.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(AdError::TruncatedTape {
                offset: self.bytes.len(),
                needed: n - self.remaining(),
            });
        }
        let s = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// A count whose items take at least `min_item` bytes each. Counts the
    /// rest of the stream cannot hold fail before anything is allocated.
    fn len(&mut self, min_item: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        let needed = count.saturating_mul(min_item);
        if needed > self.remaining() {
            return Err(AdError::TruncatedTape {
                offset: self.bytes.len(),
                needed: needed - self.remaining(),
            });
        }
        Ok(count)
    }

    fn scalar<F: Float>(&mut self) -> Result<F> {
        Ok(F::read_le(self.take(F::WIDTH as usize)?))
    }
}
