//! Graphviz rendering of a parsed program, for debugging.
//!
//! The walk is read-only: it consumes the tree the parser produced and
//! emits one `digraph` node per syntax-tree node, labelled with the
//! node kind and its salient detail.

use crate::parse::Node;

pub struct DotGenerator {
    dot: String,
    counter: usize,
}

impl DotGenerator {
    pub fn generate(root: &Node) -> String {
        let mut generator = DotGenerator {
            dot: String::from("digraph G {\n"),
            counter: 0,
        };
        generator.visit(root);
        generator.dot.push_str("}\n");
        generator.dot
    }

    fn new_id(&mut self) -> String {
        let id = format!("n{}", self.counter);
        self.counter += 1;
        id
    }

    fn node(&mut self, label: &str) -> String {
        let id = self.new_id();
        self.dot.push_str(&format!("    {id} [label=\"{label}\"];\n"));
        id
    }

    fn edge(&mut self, from: &str, to: &str) {
        self.dot.push_str(&format!("    {from} -> {to};\n"));
    }

    fn labeled_edge(&mut self, from: &str, to: &str, label: &str) {
        self.dot
            .push_str(&format!("    {from} -> {to} [label=\"{label}\"];\n"));
    }

    /// Emit the subtree under `node` and return its dot id.
    fn visit(&mut self, node: &Node) -> String {
        match node {
            Node::Number(text) => self.node(&format!("{}[{text}]", node.kind())),
            Node::String(text) => self.node(&format!("{}[\\\"{text}\\\"]", node.kind())),
            Node::Boolean(text) => self.node(&format!("{}[{text}]", node.kind())),
            Node::Variable(name) => self.node(&format!("{}[{name}]", node.kind())),
            Node::Unary { op, operand } => {
                let id = self.node(&format!("{}[{op}]", node.kind()));
                let operand = self.visit(operand);
                self.edge(&id, &operand);
                id
            }
            Node::Binary { op, left, right } => {
                let id = self.node(&format!("{}[{op}]", node.kind()));
                let left = self.visit(left);
                self.edge(&id, &left);
                let right = self.visit(right);
                self.edge(&id, &right);
                id
            }
            Node::Assignment { target, value } => {
                let id = self.node(node.kind());
                let target = self.node(&format!("Var[{target}]"));
                self.edge(&id, &target);
                let value = self.visit(value);
                self.edge(&id, &value);
                id
            }
            Node::Block(statements) => {
                let id = self.node(node.kind());
                for statement in statements {
                    let statement = self.visit(statement);
                    self.edge(&id, &statement);
                }
                id
            }
            Node::If {
                condition,
                body,
                or_else,
            } => {
                let id = self.node(node.kind());
                let condition = self.visit(condition);
                self.labeled_edge(&id, &condition, "condition");
                let body = self.visit(body);
                self.labeled_edge(&id, &body, "body");
                if let Some(or_else) = or_else {
                    let or_else = self.visit(or_else);
                    self.labeled_edge(&id, &or_else, "else");
                }
                id
            }
            Node::While { condition, body } => {
                let id = self.node(node.kind());
                let condition = self.visit(condition);
                self.labeled_edge(&id, &condition, "condition");
                let body = self.visit(body);
                self.labeled_edge(&id, &body, "body");
                id
            }
            Node::Call { name, arguments } => {
                let id = self.node(&format!("{}[{name}]", node.kind()));
                for argument in arguments {
                    let argument = self.visit(argument);
                    self.edge(&id, &argument);
                }
                id
            }
            Node::FunctionDef {
                name,
                parameters,
                body,
            } => {
                let id = self.node(&format!(
                    "{}[{name}({})]",
                    node.kind(),
                    parameters.join(", ")
                ));
                let body = self.visit(body);
                self.labeled_edge(&id, &body, "body");
                id
            }
            Node::Return(value) => {
                let id = self.node(node.kind());
                let value = self.visit(value);
                self.edge(&id, &value);
                id
            }
        }
    }
}
