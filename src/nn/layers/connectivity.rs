use tracing::debug;

use crate::error::{NetworkError, Result};

use super::Dimensions;

/// One connection from an input unit to an output unit.
/// Units are addressed by flat ids `channel * spatial + y * width + x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: usize,
    pub destination: usize,
    /// Output channel of the destination.
    pub channel: usize,
    /// Kernel matrix the edge reads from. Pooling edges use their channel.
    pub kernel: usize,
    /// (row, column) inside the kernel. Always (0, 0) for pooling.
    pub offset: (usize, usize)
}

/// Which (input channel, output channel) pairs a convolution connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTable {
    input_channels: usize,
    output_channels: usize,
    connected: Vec<bool>
}

impl ConnectionTable {
    /// Every input channel feeds every output channel.
    pub fn full(input_channels: usize, output_channels: usize) -> Self {
        ConnectionTable {
            input_channels,
            output_channels,
            connected: vec![true; input_channels * output_channels]
        }
    }

    /// Builds from `rows[input_channel][output_channel]`.
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self> {
        let input_channels = rows.len();
        let output_channels = rows.first().map_or(0, |row| row.len());

        if rows.iter().any(|row| row.len() != output_channels) {
            return Err(NetworkError::Configuration("connection table rows must all be the same length".to_string()));
        }

        Ok(ConnectionTable {
            input_channels,
            output_channels,
            connected: rows.into_iter().flatten().collect()
        })
    }

    pub fn input_channels(&self) -> usize { self.input_channels }

    pub fn output_channels(&self) -> usize { self.output_channels }

    pub fn is_connected(&self, input_channel: usize, output_channel: usize) -> bool {
        self.connected[input_channel * self.output_channels + output_channel]
    }
}

/// Bipartite graph between input units and output units, held as an arena of edges
/// with adjacency lists of edge ids in both directions.
/// Built once, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ConnectivityGraph {
    edges: Vec<Edge>,
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>
}

impl ConnectivityGraph {
    fn with_units(input_units: usize, output_units: usize, edge_capacity: usize) -> Self {
        ConnectivityGraph {
            edges: Vec::with_capacity(edge_capacity),
            incoming: vec![Vec::new(); output_units],
            outgoing: vec![Vec::new(); input_units]
        }
    }

    fn push(&mut self, edge: Edge) {
        let id = self.edges.len();
        self.incoming[edge.destination].push(id);
        self.outgoing[edge.source].push(id);
        self.edges.push(edge);
    }

    /// Valid, stride 1 convolution graph.
    /// Edges are laid down per connected (input, output) channel pair, then per output
    /// position, then per kernel cell in row-major order.
    pub fn convolution(input: Dimensions, kernel: Dimensions, connections: &ConnectionTable) -> Result<Self> {
        let input_channels = connections.input_channels();
        let output_channels = connections.output_channels();

        if input.is_empty() || kernel.is_empty() {
            return Err(NetworkError::Configuration("convolution input and kernel sizes must be non-zero".to_string()));
        }
        if input_channels == 0 || output_channels == 0 {
            return Err(NetworkError::Configuration("convolution needs at least one input and one output channel".to_string()));
        }
        if kernel.height > input.height || kernel.width > input.width {
            return Err(NetworkError::Configuration(format!(
                "kernel {}x{} does not fit input {}x{}", kernel.height, kernel.width, input.height, input.width)));
        }

        let output = Dimensions::new(input.height - kernel.height + 1, input.width - kernel.width + 1);
        let connected_pairs = (0..input_channels)
            .flat_map(|i| (0..output_channels).map(move |o| (i, o)))
            .filter(|&(i, o)| connections.is_connected(i, o))
            .count();

        let mut graph = ConnectivityGraph::with_units(
            input_channels * input.area(),
            output_channels * output.area(),
            connected_pairs * output.area() * kernel.area());

        for input_channel in 0..input_channels {
            for output_channel in 0..output_channels {
                if !connections.is_connected(input_channel, output_channel) {
                    continue;
                }

                let kernel_index = output_channel * input_channels + input_channel;
                for y in 0..output.height {
                    for x in 0..output.width {
                        let destination = output_channel * output.area() + output.flat_index(y, x);
                        for ky in 0..kernel.height {
                            for kx in 0..kernel.width {
                                graph.push(Edge {
                                    source: input_channel * input.area() + input.flat_index(y + ky, x + kx),
                                    destination,
                                    channel: output_channel,
                                    kernel: kernel_index,
                                    offset: (ky, kx)
                                });
                            }
                        }
                    }
                }
            }
        }

        debug!(edges = graph.edge_count(), output_height = output.height, output_width = output.width, "built convolution graph");
        Ok(graph)
    }

    /// Non-overlapping pooling graph, one window per output unit inside each channel.
    pub fn pooling(input: Dimensions, pool: Dimensions, channels: usize) -> Result<Self> {
        if input.is_empty() || pool.is_empty() || channels == 0 {
            return Err(NetworkError::Configuration("pooling sizes and channel count must be non-zero".to_string()));
        }
        if input.height % pool.height != 0 || input.width % pool.width != 0 {
            return Err(NetworkError::Configuration(format!(
                "pool {}x{} does not divide input {}x{}", pool.height, pool.width, input.height, input.width)));
        }

        let output = Dimensions::new(input.height / pool.height, input.width / pool.width);
        let mut graph = ConnectivityGraph::with_units(
            channels * input.area(),
            channels * output.area(),
            channels * input.area());

        for channel in 0..channels {
            for y in 0..output.height {
                for x in 0..output.width {
                    let destination = channel * output.area() + output.flat_index(y, x);
                    for py in 0..pool.height {
                        for px in 0..pool.width {
                            let source_y = y * pool.height + py;
                            let source_x = x * pool.width + px;
                            graph.push(Edge {
                                source: channel * input.area() + input.flat_index(source_y, source_x),
                                destination,
                                channel,
                                kernel: channel,
                                offset: (0, 0)
                            });
                        }
                    }
                }
            }
        }

        debug!(edges = graph.edge_count(), output_height = output.height, output_width = output.width, "built pooling graph");
        Ok(graph)
    }

    pub fn edge(&self, id: usize) -> &Edge { &self.edges[id] }

    pub fn edge_count(&self) -> usize { self.edges.len() }

    pub fn input_units(&self) -> usize { self.outgoing.len() }

    pub fn output_units(&self) -> usize { self.incoming.len() }

    /// Edge ids ending at an output unit, in construction order.
    pub fn incoming(&self, destination: usize) -> &[usize] { &self.incoming[destination] }

    /// Edge ids leaving an input unit, in construction order.
    pub fn outgoing(&self, source: usize) -> &[usize] { &self.outgoing[source] }

    /// Edges ending at an output unit, in construction order.
    pub fn incoming_edges(&self, destination: usize) -> impl Iterator<Item = &Edge> + '_ {
        self.incoming[destination].iter().map(move |&id| &self.edges[id])
    }
}
