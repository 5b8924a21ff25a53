//! A single state executing in a straight
//! line produces one block edge from the synthetic root.

use super::helpers::*;
use crate::node::ROOT_BLOCK;
use crate::transport::Message;

#[test]
fn single_state_linear_execution_edges_from_root_and_flushes() {
    let mut h = default_harness();
    let module = FakeModule::tracked();
    h.boundary.on_module_load(1, &module);

    h.boundary.on_translate_block_start(1, 0x4000, 4);
    h.boundary.on_execute_block_start(1, 0x4000);
    h.boundary.on_timer();

    let message = h
        .viewer_reader
        .try_receive()
        .unwrap()
        .expect("timer flush should have produced an edge batch");
    match message {
        Message::EdgeBatch(batch) => {
            assert_eq!(batch.block_edges.len(), 1);
            assert!(batch.state_edges.is_empty());
            let edge = &batch.block_edges[0];
            assert_eq!(edge.from, ROOT_BLOCK);
            assert_eq!(edge.to.pc, 0x4000);
            assert_eq!(edge.to.generation, 1);
        }
        _ => panic!("expected an edge batch"),
    }
}

#[test]
fn second_block_in_the_same_state_edges_from_the_first() {
    let mut h = default_harness();
    let module = FakeModule::tracked();
    h.boundary.on_module_load(1, &module);

    h.boundary.on_translate_block_start(1, 0x4000, 4);
    h.boundary.on_execute_block_start(1, 0x4000);
    h.boundary.on_translate_block_start(1, 0x4010, 4);
    h.boundary.on_execute_block_start(1, 0x4010);
    h.boundary.on_timer();

    let Message::EdgeBatch(batch) = h.viewer_reader.try_receive().unwrap().unwrap() else {
        panic!("expected an edge batch");
    };
    assert_eq!(batch.block_edges.len(), 2);
    assert_eq!(batch.block_edges[0].to.pc, 0x4000);
    assert_eq!(batch.block_edges[1].from.pc, 0x4000);
    assert_eq!(batch.block_edges[1].to.pc, 0x4010);
}
