//! METIS-format graph reading and partition writing.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::defs::*;
use crate::graph::Graph;
use crate::{Error, Result};

/// Reads a graph in METIS format from `path`.
pub fn read_graph<P: AsRef<Path>>(path: P) -> Result<Graph> {
    let file = File::open(path.as_ref())?;
    read_graph_from(BufReader::new(file))
}

/// Reads a graph in METIS format.
///
/// The header line is `n m [fmt [ncon]]` where the three digits of `fmt`
/// flag node sizes, node weights, and edge weights. Each following
/// non-comment line lists node i's adjacency with 1-based neighbor ids,
/// preceded by its size and weights as flagged. Comment lines start with
/// `%`. Node sizes are parsed and skipped; multi-constraint inputs
/// (`ncon > 1`) are rejected.
pub fn read_graph_from<R: BufRead>(reader: R) -> Result<Graph> {
    let mut lines = reader.lines();

    let header = loop {
        match lines.next() {
            Some(line) => {
                let line = line?;
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with('%') {
                    break trimmed.to_owned();
                }
            }
            None => return Err(Error::InvalidInput("missing header line".into())),
        }
    };

    let mut fields = header.split_whitespace();
    let n: usize = parse_field(fields.next(), "node count")?;
    let m: usize = parse_field(fields.next(), "edge count")?;
    let fmt = match fields.next() {
        Some(s) => s.to_owned(),
        None => "000".to_owned(),
    };
    if fmt.len() > 3 || !fmt.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(Error::InvalidInput(format!("bad fmt field '{fmt}'")));
    }
    let fmt_bits = format!("{fmt:0>3}");
    let has_sizes = fmt_bits.as_bytes()[0] == b'1';
    let has_node_weights = fmt_bits.as_bytes()[1] == b'1';
    let has_edge_weights = fmt_bits.as_bytes()[2] == b'1';
    let ncon: usize = match fields.next() {
        Some(s) => parse_field(Some(s), "ncon")?,
        None => 1,
    };
    if ncon > 1 {
        return Err(Error::InvalidInput(format!(
            "multi-constraint graphs are not supported (ncon = {ncon})"
        )));
    }

    let mut xadj = Vec::with_capacity(n + 1);
    xadj.push(0 as EdgeId);
    let mut adj = Vec::with_capacity(2 * m);
    let mut node_weights = if has_node_weights { Vec::with_capacity(n) } else { Vec::new() };
    let mut edge_weights = if has_edge_weights { Vec::with_capacity(2 * m) } else { Vec::new() };

    let mut node = 0usize;
    while node < n {
        let line = match lines.next() {
            Some(line) => line?,
            None => {
                return Err(Error::InvalidInput(format!(
                    "file ends after {node} of {n} node lines"
                )))
            }
        };
        let trimmed = line.trim();
        if trimmed.starts_with('%') {
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        if has_sizes {
            let _: NodeWeight = parse_field(tokens.next(), "node size")?;
        }
        if has_node_weights {
            let w: NodeWeight = parse_field(tokens.next(), "node weight")?;
            if w < 0 {
                return Err(Error::InvalidInput(format!("negative weight for node {node}")));
            }
            node_weights.push(w);
        }
        loop {
            let Some(token) = tokens.next() else { break };
            let neighbor: usize = token
                .parse()
                .map_err(|_| Error::InvalidInput(format!("bad neighbor id '{token}'")))?;
            if neighbor < 1 || neighbor > n {
                return Err(Error::InvalidInput(format!(
                    "neighbor id {neighbor} of node {} out of range 1..={n}",
                    node + 1
                )));
            }
            adj.push((neighbor - 1) as NodeId);
            if has_edge_weights {
                let w: EdgeWeight = parse_field(tokens.next(), "edge weight")?;
                if w < 0 {
                    return Err(Error::InvalidInput(format!("negative edge weight at node {node}")));
                }
                edge_weights.push(w);
            }
        }
        xadj.push(adj.len() as EdgeId);
        node += 1;
    }

    if adj.len() != 2 * m {
        return Err(Error::InvalidInput(format!(
            "header announces {m} edges but the adjacency lists hold {} entries (expected {})",
            adj.len(),
            2 * m
        )));
    }

    let graph = Graph::new(xadj, adj, node_weights, edge_weights)?;
    graph.validate_undirected()?;
    Ok(graph)
}

fn parse_field<T: std::str::FromStr>(token: Option<&str>, what: &str) -> Result<T> {
    token
        .ok_or_else(|| Error::InvalidInput(format!("missing {what}")))?
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad {what}")))
}

/// Writes a partition as plain text, one block id per line in node order.
pub fn write_partition<P: AsRef<Path>>(path: P, partition: &[BlockId]) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    for &block in partition {
        writeln!(writer, "{block}")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<Graph> {
        read_graph_from(Cursor::new(text))
    }

    #[test]
    fn unweighted_graph() {
        // the triangle plus a pendant node from the METIS manual style
        let g = parse("% a comment\n4 4\n2 3\n1 3\n1 2 4\n3\n").unwrap();
        assert_eq!(g.n(), 4);
        assert_eq!(g.m(), 8);
        assert_eq!(g.node_weight(0), 1);
        assert_eq!(g.edge_weight(0), 1);
        let nbrs: Vec<_> = g.neighbors(2).collect();
        assert_eq!(nbrs, vec![0, 1, 3]);
    }

    #[test]
    fn weighted_nodes_and_edges() {
        let g = parse("3 2 011\n5 2 7\n3 1 7 3 2\n4 2 2\n").unwrap();
        assert_eq!(g.n(), 3);
        assert_eq!(g.node_weight(0), 5);
        assert_eq!(g.node_weight(1), 3);
        assert_eq!(g.node_weight(2), 4);
        assert_eq!(g.total_node_weight(), 12);
        let row: Vec<_> = g.neighbors_weighted(1).collect();
        assert_eq!(row, vec![(0, 7), (2, 2)]);
    }

    #[test]
    fn node_sizes_are_skipped() {
        let g = parse("2 1 100\n9 2\n7 1\n").unwrap();
        assert_eq!(g.n(), 2);
        assert_eq!(g.node_weight(0), 1);
    }

    #[test]
    fn comments_between_node_lines() {
        let g = parse("2 1\n2\n% interlude\n1\n").unwrap();
        assert_eq!(g.m(), 2);
    }

    #[test]
    fn rejects_asymmetric_input() {
        assert!(parse("2 1\n2\n\n").is_err());
    }

    #[test]
    fn rejects_multi_constraint() {
        let err = parse("2 1 011 2\n1 1 2 5\n1 1 1 5\n").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rejects_out_of_range_neighbor() {
        assert!(parse("2 1\n3\n1\n").is_err());
    }

    #[test]
    fn rejects_wrong_edge_count() {
        assert!(parse("3 5\n2\n1 3\n2\n").is_err());
    }

    #[test]
    fn empty_graph() {
        let g = parse("0 0\n").unwrap();
        assert_eq!(g.n(), 0);
        assert_eq!(g.m(), 0);
    }

    #[test]
    fn partition_round_trip() {
        let dir = std::env::temp_dir().join("parcut-io-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("partition.txt");
        write_partition(&path, &[0, 2, 1, 1]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0\n2\n1\n1\n");
        std::fs::remove_file(&path).unwrap();
    }
}
