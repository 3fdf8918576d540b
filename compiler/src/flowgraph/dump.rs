//! Flow graph dump utilities
//!
//! Pretty-prints a built [`FlowGraph`] in a compact text form for debugging,
//! and offers a serde-serializable summary for golden tests and bug reports.

use std::fmt::Write;

use serde::Serialize;

use super::FlowGraph;

/// Serializable summary of one flow graph
#[derive(Debug, Serialize)]
pub struct FlowGraphDump {
    pub nodes: usize,
    pub blocks: Vec<BlockDump>,
}

#[derive(Debug, Serialize)]
pub struct BlockDump {
    pub id: u32,
    pub begin: u32,
    pub len: u32,
    pub idom: u32,
    pub reachable: bool,
    pub preds: Vec<u32>,
    pub succs: Vec<u32>,
    pub frontier: Vec<u32>,
    pub phis: Vec<PhiDump>,
    pub inputs: Vec<String>,
    pub outputs: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
pub struct PhiDump {
    pub var: String,
    pub version: String,
    pub incoming: Vec<(u32, String)>,
}

pub fn dump(graph: &FlowGraph) -> FlowGraphDump {
    FlowGraphDump {
        nodes: graph.order.len(),
        blocks: graph
            .blocks
            .iter()
            .map(|block| BlockDump {
                id: block.id.as_raw(),
                begin: block.begin,
                len: block.len,
                idom: block.idom.as_raw(),
                reachable: block.reachable,
                preds: block.preds.iter().map(|p| p.as_raw()).collect(),
                succs: block.succs.iter().map(|s| s.as_raw()).collect(),
                frontier: block.frontier.iter().map(|f| f.as_raw()).collect(),
                phis: block
                    .phis
                    .values()
                    .map(|phi| PhiDump {
                        var: phi.key.to_string(),
                        version: phi.version.to_string(),
                        incoming: phi
                            .incoming
                            .iter()
                            .map(|s| (s.block.as_raw(), s.version.to_string()))
                            .collect(),
                    })
                    .collect(),
                inputs: block.inputs.iter().map(|k| k.to_string()).collect(),
                outputs: block
                    .outputs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            })
            .collect(),
    }
}

pub fn to_json_string(graph: &FlowGraph) -> String {
    serde_json::to_string_pretty(&dump(graph)).expect("flow graph dump is serializable")
}

/// Human-readable text dump, one block per paragraph.
pub fn dump_text(graph: &FlowGraph) -> String {
    let mut out = String::new();
    writeln!(out, "; {} nodes, {} blocks", graph.order.len(), graph.blocks.len()).unwrap();
    for block in &graph.blocks {
        let reach = if block.reachable { "" } else { " (unreachable)" };
        writeln!(
            out,
            "{}: nodes [{}, {}) idom {}{}",
            block.id,
            block.begin,
            block.begin + block.len,
            block.idom,
            reach
        )
        .unwrap();
        if !block.preds.is_empty() || !block.succs.is_empty() {
            let preds: Vec<String> = block.preds.iter().map(|p| p.to_string()).collect();
            let succs: Vec<String> = block.succs.iter().map(|s| s.to_string()).collect();
            writeln!(out, "  preds [{}] succs [{}]", preds.join(" "), succs.join(" ")).unwrap();
        }
        if !block.frontier.is_empty() {
            let df: Vec<String> = block.frontier.iter().map(|f| f.to_string()).collect();
            writeln!(out, "  frontier [{}]", df.join(" ")).unwrap();
        }
        for phi in block.phis.values() {
            let incoming: Vec<String> = phi.incoming.iter().map(|s| s.to_string()).collect();
            writeln!(
                out,
                "  phi {} {} <- [{}]",
                phi.key,
                phi.version,
                incoming.join(" ")
            )
            .unwrap();
        }
        for (key, version) in &block.outputs {
            writeln!(out, "  out {} {}", key, version).unwrap();
        }
    }
    out
}
