//! Binary encoding for the outbound/inbound wire grammar.
//!
//! ```text
//! node := kind:u8 | internal_state_id:u32 | host_state_id:i32
//!       | basic_block_vaddr:u64 | basic_block_generation:u64
//!       | basic_block_elf_vaddr:u64 | basic_block_bytes:bytes
//!       | concrete_inputs { names:seq<string>, byte_counts:seq<i32>, bytes:bytes }
//!
//! edge_batch := seq<(node, node)> state_edges, seq<(node, node)> block_edges
//! prioritise_states := seq<i32>
//! ```
//!
//! All integers are little-endian; a matched plugin/consumer build is the
//! only compatibility requirement.

use bytes::{Buf, BufMut, BytesMut};

use crate::edge_batcher::{Edge, EdgeBatch};
use crate::error::FlowtraceError;
use crate::identity::{HostStateId, InternalStateId};
use crate::node::{BlockNode, StateNode, SymbolicInputWitness};

const KIND_STATE: u8 = 0;
const KIND_BLOCK: u8 = 1;

pub enum Message {
    EdgeBatch(EdgeBatch),
    PrioritiseStates(Vec<HostStateId>),
}

const TAG_EDGE_BATCH: u8 = 0;
const TAG_PRIORITISE_STATES: u8 = 1;

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn get_bytes(buf: &mut impl Buf) -> Result<Vec<u8>, FlowtraceError> {
    if buf.remaining() < 4 {
        return Err(FlowtraceError::Malformed("truncated byte-sequence length".into()));
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(FlowtraceError::Malformed("truncated byte-sequence body".into()));
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn put_string(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

fn get_string(buf: &mut impl Buf) -> Result<String, FlowtraceError> {
    let bytes = get_bytes(buf)?;
    String::from_utf8(bytes).map_err(|e| FlowtraceError::Malformed(e.to_string()))
}

fn put_witness(buf: &mut BytesMut, witness: &SymbolicInputWitness) {
    buf.put_u32_le(witness.names.len() as u32);
    for name in &witness.names {
        put_string(buf, name);
    }
    buf.put_u32_le(witness.byte_counts.len() as u32);
    for count in &witness.byte_counts {
        buf.put_i32_le(*count);
    }
    put_bytes(buf, &witness.bytes);
}

fn get_witness(buf: &mut impl Buf) -> Result<SymbolicInputWitness, FlowtraceError> {
    if buf.remaining() < 4 {
        return Err(FlowtraceError::Malformed("truncated witness names count".into()));
    }
    let name_count = buf.get_u32_le();
    let mut names = Vec::with_capacity(name_count as usize);
    for _ in 0..name_count {
        names.push(get_string(buf)?);
    }
    if buf.remaining() < 4 {
        return Err(FlowtraceError::Malformed("truncated witness byte-count count".into()));
    }
    let count_count = buf.get_u32_le();
    let mut byte_counts = Vec::with_capacity(count_count as usize);
    for _ in 0..count_count {
        if buf.remaining() < 4 {
            return Err(FlowtraceError::Malformed("truncated witness byte-count".into()));
        }
        byte_counts.push(buf.get_i32_le());
    }
    let bytes = get_bytes(buf)?;
    Ok(SymbolicInputWitness {
        names,
        byte_counts,
        bytes,
    })
}

fn put_state_node(buf: &mut BytesMut, node: &StateNode) {
    buf.put_u8(KIND_STATE);
    buf.put_u32_le(node.internal_id.get());
    buf.put_i32_le(node.host_id);
    buf.put_u64_le(0); // basic_block_vaddr
    buf.put_u64_le(0); // basic_block_generation
    buf.put_u64_le(0); // basic_block_elf_vaddr
    put_bytes(buf, &[]); // basic_block_bytes
    put_witness(buf, &node.inputs);
}

fn put_block_node(buf: &mut BytesMut, node: &BlockNode) {
    buf.put_u8(KIND_BLOCK);
    buf.put_u32_le(node.state.get());
    buf.put_i32_le(0); // host_state_id
    buf.put_u64_le(node.pc);
    buf.put_u64_le(node.generation);
    buf.put_u64_le(node.elf_vaddr);
    put_bytes(buf, &node.bytes);
    put_witness(buf, &SymbolicInputWitness::default());
}

enum DecodedNode {
    State(StateNode),
    Block(BlockNode),
}

fn get_node(buf: &mut impl Buf) -> Result<DecodedNode, FlowtraceError> {
    if buf.remaining() < 1 + 4 + 4 + 8 + 8 + 8 {
        return Err(FlowtraceError::Malformed("truncated node header".into()));
    }
    let kind = buf.get_u8();
    let internal_raw = buf.get_u32_le();
    let host_id = buf.get_i32_le();
    let pc = buf.get_u64_le();
    let generation = buf.get_u64_le();
    let elf_vaddr = buf.get_u64_le();
    let bytes = get_bytes(buf)?;
    let witness = get_witness(buf)?;

    let internal_id = internal_from_raw(internal_raw);
    match kind {
        KIND_STATE => Ok(DecodedNode::State(StateNode {
            internal_id,
            host_id,
            inputs: witness,
        })),
        KIND_BLOCK => Ok(DecodedNode::Block(BlockNode {
            state: internal_id,
            pc,
            generation,
            elf_vaddr,
            bytes,
        })),
        other => Err(FlowtraceError::Malformed(format!("unknown node kind {other}"))),
    }
}

fn internal_from_raw(raw: u32) -> InternalStateId {
    InternalStateId::from_raw(raw)
}

pub fn encode_edge_batch(buf: &mut BytesMut, batch: &EdgeBatch) {
    buf.put_u8(TAG_EDGE_BATCH);
    buf.put_u32_le(batch.state_edges.len() as u32);
    for Edge { from, to } in &batch.state_edges {
        put_state_node(buf, from);
        put_state_node(buf, to);
    }
    buf.put_u32_le(batch.block_edges.len() as u32);
    for Edge { from, to } in &batch.block_edges {
        put_block_node(buf, from);
        put_block_node(buf, to);
    }
}

pub fn encode_prioritise_states(buf: &mut BytesMut, ids: &[HostStateId]) {
    buf.put_u8(TAG_PRIORITISE_STATES);
    buf.put_u32_le(ids.len() as u32);
    for id in ids {
        buf.put_i32_le(*id);
    }
}

pub fn decode_message(buf: &mut impl Buf) -> Result<Message, FlowtraceError> {
    if buf.remaining() < 1 {
        return Err(FlowtraceError::Malformed("empty message".into()));
    }
    let tag = buf.get_u8();
    match tag {
        TAG_EDGE_BATCH => {
            if buf.remaining() < 4 {
                return Err(FlowtraceError::Malformed("truncated state-edge count".into()));
            }
            let state_count = buf.get_u32_le();
            let mut state_edges = Vec::with_capacity(state_count as usize);
            for _ in 0..state_count {
                let from = expect_state(get_node(buf)?)?;
                let to = expect_state(get_node(buf)?)?;
                state_edges.push(Edge { from, to });
            }
            if buf.remaining() < 4 {
                return Err(FlowtraceError::Malformed("truncated block-edge count".into()));
            }
            let block_count = buf.get_u32_le();
            let mut block_edges = Vec::with_capacity(block_count as usize);
            for _ in 0..block_count {
                let from = expect_block(get_node(buf)?)?;
                let to = expect_block(get_node(buf)?)?;
                block_edges.push(Edge { from, to });
            }
            Ok(Message::EdgeBatch(EdgeBatch {
                state_edges,
                block_edges,
            }))
        }
        TAG_PRIORITISE_STATES => {
            if buf.remaining() < 4 {
                return Err(FlowtraceError::Malformed("truncated id count".into()));
            }
            let count = buf.get_u32_le();
            let mut ids = Vec::with_capacity(count as usize);
            for _ in 0..count {
                if buf.remaining() < 4 {
                    return Err(FlowtraceError::Malformed("truncated host state id".into()));
                }
                ids.push(buf.get_i32_le());
            }
            Ok(Message::PrioritiseStates(ids))
        }
        other => Err(FlowtraceError::Malformed(format!("unknown message tag {other}"))),
    }
}

fn expect_state(node: DecodedNode) -> Result<StateNode, FlowtraceError> {
    match node {
        DecodedNode::State(s) => Ok(s),
        DecodedNode::Block(_) => Err(FlowtraceError::Malformed("expected state node, got block".into())),
    }
}

fn expect_block(node: DecodedNode) -> Result<BlockNode, FlowtraceError> {
    match node {
        DecodedNode::Block(b) => Ok(b),
        DecodedNode::State(_) => Err(FlowtraceError::Malformed("expected block node, got state".into())),
    }
}
