use entity_graph_macros::GraphEntity;

#[derive(Debug, GraphEntity)]
struct NoIdentity {
    label: String,
}

fn main() {}
