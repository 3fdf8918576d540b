//! Tests for phi placement, SSA renaming, and the uninitialized analysis
//!
//! These run the full pipeline over small hand-built function bodies and
//! inspect the resulting blocks, phi nodes, and diagnostics.

use diagnostics::DiagnosticEngine;

use super::ssa::non_sentinel_versions;
use super::{build_flow_graph, BuildOptions, FlowGraph};
use crate::ast::{AstArena, NodeId, NodeKind, SourceLocation, StorageClass, VarKey, Version};
use crate::error_codes;

fn loc() -> SourceLocation {
    SourceLocation::unknown()
}

fn function(arena: &mut AstArena, body: &[NodeId]) -> NodeId {
    arena.alloc_with_children(
        NodeKind::Function {
            name: "test".into(),
        },
        loc(),
        body,
    )
}

/// `<key> = <opaque value>`
fn assign(arena: &mut AstArena, key: VarKey) -> NodeId {
    let value = arena.alloc(NodeKind::Expr, loc());
    let write = arena.var_write(key, loc());
    arena.alloc_with_children(NodeKind::Expr, loc(), &[value, write])
}

/// `return <key>`
fn return_var(arena: &mut AstArena, key: VarKey) -> NodeId {
    let read = arena.var_read(key, loc());
    arena.alloc_with_children(NodeKind::Return, loc(), &[read])
}

fn compile(arena: &mut AstArena, func: NodeId) -> (FlowGraph, DiagnosticEngine) {
    let mut diags = DiagnosticEngine::default();
    let graph = build_flow_graph(arena, func, &mut diags, &BuildOptions { validate: true })
        .expect("pipeline must not abort");
    (graph, diags)
}

fn all_phis(graph: &FlowGraph) -> Vec<&super::PhiNode> {
    graph
        .blocks
        .iter()
        .flat_map(|b| b.phis.values())
        .collect()
}

#[test]
fn straight_line_assignment_versions() {
    // x = ...; x = ...; return x;
    let mut arena = AstArena::new();
    let x = VarKey::local(0);
    let w1 = assign(&mut arena, x);
    let w2 = assign(&mut arena, x);
    let ret = return_var(&mut arena, x);
    let func = function(&mut arena, &[w1, w2, ret]);

    let (graph, diags) = compile(&mut arena, func);

    assert!(diags.is_empty());
    assert!(all_phis(&graph).is_empty());

    let v1 = arena.node(arena.node(w1).children[1]).var.unwrap();
    let v2 = arena.node(arena.node(w2).children[1]).var.unwrap();
    assert_eq!(v1.output_version, Some(Version::new(0)));
    assert_eq!(v2.output_version, Some(Version::new(1)));

    // The read consumes the last definition.
    let read = arena.node(arena.node(ret).children[0]).var.unwrap();
    assert_eq!(read.input_version, Some(Version::new(1)));
}

#[test]
fn if_else_joins_with_one_phi() {
    // if (c) { x = 1; } else { x = 2; } return x;
    let mut arena = AstArena::new();
    let c = VarKey::argument(0);
    let x = VarKey::local(0);
    let cond = arena.var_read(c, loc());
    let then_branch = assign(&mut arena, x);
    let else_branch = assign(&mut arena, x);
    let if_node =
        arena.alloc_with_children(NodeKind::If, loc(), &[cond, then_branch, else_branch]);
    let ret = return_var(&mut arena, x);
    let func = function(&mut arena, &[if_node, ret]);

    let (graph, diags) = compile(&mut arena, func);

    assert_eq!(diags.len(), 0, "no diagnostics expected");

    let phis = all_phis(&graph);
    assert_eq!(phis.len(), 1);
    let phi = phis[0];
    assert_eq!(phi.key, x);
    assert!(phi.version.is_real());
    assert_eq!(phi.incoming.len(), 2);
    assert!(phi.incoming.iter().all(|s| s.version.is_real()));

    // The phi lives at the join block, where the read picks it up.
    let join = arena.node(if_node).block;
    assert!(graph.block(join).phi(x).is_some());
    let read = arena.node(arena.node(ret).children[0]).var.unwrap();
    assert_eq!(read.input_version, Some(phi.version));
}

#[test]
fn one_sided_if_is_possibly_uninitialized() {
    // if (c) { x = 1; } return x;
    let mut arena = AstArena::new();
    let c = VarKey::argument(0);
    let x = VarKey::local(0);
    let cond = arena.var_read(c, loc());
    let then_branch = assign(&mut arena, x);
    let if_node = arena.alloc_with_children(NodeKind::If, loc(), &[cond, then_branch]);
    let ret = return_var(&mut arena, x);
    let func = function(&mut arena, &[if_node, ret]);

    let (graph, diags) = compile(&mut arena, func);

    // Exactly one warning, at the read.
    assert_eq!(diags.error_count(), 0);
    assert_eq!(diags.warning_count(), 1);
    let warning = diags.warnings().next().unwrap();
    assert_eq!(warning.code, Some(error_codes::POSSIBLY_UNINITIALIZED));

    // One phi with an incoming entry resolving to UNINITIALIZED via block 0.
    let phis = all_phis(&graph);
    assert_eq!(phis.len(), 1);
    let phi = phis[0];
    assert_eq!(phi.version, Version::PARTIALLY_INITIALIZED);
    assert!(phi
        .incoming
        .iter()
        .any(|s| s.block.as_raw() == 0 && s.version == Version::UNINITIALIZED));
    assert!(phi.incoming.iter().any(|s| s.version.is_real()));

    // The read is healed so later passes see a concrete version.
    let join = arena.node(if_node).block;
    assert_eq!(graph.block(join).outputs.get(&x), Some(&Version::ZERO));
}

#[test]
fn read_of_never_written_local_is_an_error() {
    // return x; with no definition anywhere
    let mut arena = AstArena::new();
    let x = VarKey::local(0);
    let ret = return_var(&mut arena, x);
    let func = function(&mut arena, &[ret]);

    let (_, diags) = compile(&mut arena, func);

    assert_eq!(diags.error_count(), 1);
    let error = diags.errors().next().unwrap();
    assert_eq!(error.code, Some(error_codes::UNINITIALIZED_VARIABLE));
}

#[test]
fn arguments_and_fields_are_defined_on_entry() {
    // return a + this.f; reads only, no diagnostics
    let mut arena = AstArena::new();
    let a = VarKey::argument(0);
    let f = VarKey::new(StorageClass::ObjectField, 2);
    let read_a = arena.var_read(a, loc());
    let read_f = arena.var_read(f, loc());
    let sum = arena.alloc_with_children(NodeKind::Expr, loc(), &[read_a, read_f]);
    let ret = arena.alloc_with_children(NodeKind::Return, loc(), &[sum]);
    let func = function(&mut arena, &[ret]);

    let (graph, diags) = compile(&mut arena, func);

    assert!(diags.is_empty());
    // Both got a synthesized real definition in block 0.
    let outside = &graph.blocks[0];
    assert!(outside.outputs.get(&a).is_some_and(|v| v.is_real()));
    assert!(outside.outputs.get(&f).is_some_and(|v| v.is_real()));
}

#[test]
fn while_loop_phi_at_header() {
    // x = 0; while (c) { x = x + 1; } return x;
    let mut arena = AstArena::new();
    let c = VarKey::argument(0);
    let x = VarKey::local(0);
    let init = assign(&mut arena, x);
    let cond = arena.var_read(c, loc());
    let read_x = arena.var_read(x, loc());
    let one = arena.alloc(NodeKind::Expr, loc());
    let sum = arena.alloc_with_children(NodeKind::Expr, loc(), &[read_x, one]);
    let write_x = arena.var_write(x, loc());
    let body_assign = arena.alloc_with_children(NodeKind::Expr, loc(), &[sum, write_x]);
    let body = arena.alloc_with_children(NodeKind::Block, loc(), &[body_assign]);
    let while_node = arena.alloc_with_children(NodeKind::While, loc(), &[cond, body]);
    let ret = return_var(&mut arena, x);
    let func = function(&mut arena, &[init, while_node, ret]);

    let (graph, diags) = compile(&mut arena, func);

    assert!(diags.is_empty());
    let phis = all_phis(&graph);
    assert_eq!(phis.len(), 1);
    let phi = phis[0];
    assert_eq!(phi.key, x);
    assert!(phi.version.is_real());
    // Initial definition plus the back-edge definition.
    assert_eq!(phi.incoming.len(), 2);
    assert!(phi.incoming.iter().all(|s| s.version.is_real()));

    // Inside the loop the read sees the phi, not the initial write.
    let read = arena.node(read_x).var.unwrap();
    assert_eq!(read.input_version, Some(phi.version));

    // The final read also sees the phi (the loop may run zero times).
    let final_read = arena.node(arena.node(ret).children[0]).var.unwrap();
    assert_eq!(final_read.input_version, Some(phi.version));
}

#[test]
fn compound_assignment_reads_then_writes() {
    // x = ...; x += 1;
    let mut arena = AstArena::new();
    let x = VarKey::local(0);
    let init = assign(&mut arena, x);
    let one = arena.alloc(NodeKind::Expr, loc());
    let rw = arena.alloc_var(crate::ast::VarRef::read_write(x), loc());
    let compound = arena.alloc_with_children(NodeKind::Expr, loc(), &[one, rw]);
    let func = function(&mut arena, &[init, compound]);

    let (_, diags) = compile(&mut arena, func);
    assert!(diags.is_empty());

    let var = arena.node(rw).var.unwrap();
    assert_eq!(var.input_version, Some(Version::new(0)));
    assert_eq!(var.output_version, Some(Version::new(1)));
}

#[test]
fn versions_are_never_reused() {
    // Nested branching writing two variables
    let mut arena = AstArena::new();
    let c = VarKey::argument(0);
    let x = VarKey::local(0);
    let y = VarKey::local(1);

    let cond1 = arena.var_read(c, loc());
    let wx1 = assign(&mut arena, x);
    let wy1 = assign(&mut arena, y);
    let arm1 = arena.alloc_with_children(NodeKind::Block, loc(), &[wx1, wy1]);
    let wx2 = assign(&mut arena, x);
    let inner_cond = arena.var_read(c, loc());
    let wy2 = assign(&mut arena, y);
    let inner_if = arena.alloc_with_children(NodeKind::If, loc(), &[inner_cond, wy2]);
    let arm2 = arena.alloc_with_children(NodeKind::Block, loc(), &[wx2, inner_if]);
    let outer_if = arena.alloc_with_children(NodeKind::If, loc(), &[cond1, arm1, arm2]);
    let wx3 = assign(&mut arena, x);
    let func = function(&mut arena, &[outer_if, wx3]);

    let (graph, _) = compile(&mut arena, func);

    let versions = non_sentinel_versions(&graph.blocks, &arena, &graph.order);
    let mut seen = std::collections::BTreeSet::new();
    for (key, version) in versions {
        assert!(
            seen.insert((key, version)),
            "version {} of {} assigned twice",
            version,
            key
        );
    }
}

#[test]
fn phi_incoming_covers_all_predecessors() {
    // switch-like multi-way join via nested ifs
    let mut arena = AstArena::new();
    let c = VarKey::argument(0);
    let x = VarKey::local(0);

    let cond1 = arena.var_read(c, loc());
    let w1 = assign(&mut arena, x);
    let cond2 = arena.var_read(c, loc());
    let w2 = assign(&mut arena, x);
    let w3 = assign(&mut arena, x);
    let inner = arena.alloc_with_children(NodeKind::If, loc(), &[cond2, w2, w3]);
    let outer = arena.alloc_with_children(NodeKind::If, loc(), &[cond1, w1, inner]);
    let ret = return_var(&mut arena, x);
    let func = function(&mut arena, &[outer, ret]);

    let (graph, diags) = compile(&mut arena, func);

    assert!(diags.is_empty());
    for block in &graph.blocks {
        for phi in block.phis.values() {
            assert!(!phi.incoming.is_empty());
            assert!(phi.incoming.len() <= block.preds.len());
            // Every predecessor is covered either by a definition found on
            // its own idom path or by the idom fallback entry.
            let covered_directly = phi
                .incoming
                .iter()
                .filter(|s| block.preds.contains(&s.block))
                .count();
            if covered_directly < block.preds.len() {
                assert!(phi
                    .incoming
                    .iter()
                    .any(|s| !block.preds.contains(&s.block)));
            }
        }
    }
}

#[test]
fn outputs_hold_last_definition() {
    // x = ...; x = ...; in one block
    let mut arena = AstArena::new();
    let x = VarKey::local(0);
    let w1 = assign(&mut arena, x);
    let w2 = assign(&mut arena, x);
    let func = function(&mut arena, &[w1, w2]);

    let (graph, _) = compile(&mut arena, func);

    let block = arena.node(w2).block;
    let last = arena.node(arena.node(w2).children[1]).var.unwrap();
    assert_eq!(
        graph.block(block).outputs.get(&x),
        last.output_version.as_ref()
    );
}

#[test]
fn inputs_collect_reads_per_block() {
    let mut arena = AstArena::new();
    let x = VarKey::local(0);
    let y = VarKey::local(1);
    let wx = assign(&mut arena, x);
    let wy = assign(&mut arena, y);
    let rx = arena.var_read(x, loc());
    let ry = arena.var_read(y, loc());
    let use_both = arena.alloc_with_children(NodeKind::Expr, loc(), &[rx, ry]);
    let func = function(&mut arena, &[wx, wy, use_both]);

    let (graph, _) = compile(&mut arena, func);

    let block = arena.node(use_both).block;
    assert!(graph.block(block).inputs.contains(&x));
    assert!(graph.block(block).inputs.contains(&y));
}
