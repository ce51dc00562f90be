use std::fmt::Display;

use miette::{Error, LabeledSpan, miette};

use crate::lex::{Lexer, Token, TokenKind};

/// A node of the syntax tree. Every node exclusively owns its children;
/// the tree is built once by the parser and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(String),
    String(String),
    Boolean(String),
    Variable(String),
    Unary {
        op: Op,
        operand: Box<Node>,
    },
    Binary {
        op: Op,
        left: Box<Node>,
        right: Box<Node>,
    },
    Assignment {
        target: String,
        value: Box<Node>,
    },
    Block(Vec<Node>),
    If {
        condition: Box<Node>,
        body: Box<Node>,
        /// Either a nested `If` (an `elif` chain) or a plain `Block`
        /// (a terminal `else`).
        or_else: Option<Box<Node>>,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
    },
    Call {
        name: String,
        arguments: Vec<Node>,
    },
    FunctionDef {
        name: String,
        parameters: Vec<String>,
        body: Box<Node>,
    },
    Return(Box<Node>),
}

impl Node {
    /// The node-kind name external consumers (e.g. the dot exporter)
    /// switch on.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Number(_) => "Number",
            Node::String(_) => "String",
            Node::Boolean(_) => "Boolean",
            Node::Variable(_) => "Var",
            Node::Unary { .. } => "UnaryOp",
            Node::Binary { .. } => "BinaryOp",
            Node::Assignment { .. } => "Assignment",
            Node::Block(_) => "Block",
            Node::If { .. } => "If",
            Node::While { .. } => "While",
            Node::Call { .. } => "FunctionCall",
            Node::FunctionDef { .. } => "FunctionDef",
            Node::Return(_) => "Return",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    EqEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Not,
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::EqEqual => "==",
            Op::NotEqual => "!=",
            Op::Less => "<",
            Op::LessEqual => "<=",
            Op::Greater => ">",
            Op::GreaterEqual => ">=",
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
        };
        f.write_str(op)
    }
}

/// Recursive-descent parser over the lexer's token stream.
///
/// One token of lookahead is held in `current`; the lexer's own `peek`
/// supplies the second token needed to tell `NAME = ...` apart from an
/// expression starting with `NAME`. The first mismatch against the
/// grammar aborts the whole parse.
pub struct Parser<'src> {
    whole: &'src str,
    lexer: Lexer<'src>,
    current: Token<'src>,
}

impl<'src> Parser<'src> {
    pub fn new(filename: Option<&'src str>, input: &'src str) -> Self {
        Parser {
            whole: input,
            lexer: Lexer::new(filename, input),
            current: Token::structural(TokenKind::Eof),
        }
    }

    /// program := statements EOF
    ///
    /// The result is the program root: a `Block` of top-level statements.
    pub fn parse(mut self) -> Result<Node, Error> {
        self.bump()?;
        // newlines before the first statement carry no structure
        while self.current.kind == TokenKind::Newline {
            self.bump()?;
        }
        let statements = self.statements()?;
        self.eat(TokenKind::Eof)?;
        Ok(Node::Block(statements))
    }

    fn bump(&mut self) -> Result<(), Error> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn eat(&mut self, expected: TokenKind) -> Result<Token<'src>, Error> {
        if self.current.kind != expected {
            return Err(self.unexpected(&format!(
                "expected {expected}, found {}",
                self.current.kind
            )));
        }
        let token = std::mem::replace(&mut self.current, Token::structural(TokenKind::Eof));
        self.current = self.lexer.next_token()?;
        Ok(token)
    }

    fn unexpected(&self, message: &str) -> Error {
        miette!(
            labels = vec![LabeledSpan::at(self.lexer.last_span(), "here")],
            "{message}",
        )
        .with_source_code(self.whole.to_string())
    }

    /// statements := ( compound_stmt | simple_stmt NEWLINE )*
    ///
    /// Ends on EOF or on the DEDENT closing the enclosing block.
    fn statements(&mut self) -> Result<Vec<Node>, Error> {
        let mut statements = Vec::new();
        while self.current.kind != TokenKind::Eof && self.current.kind != TokenKind::Dedent {
            match self.current.kind {
                TokenKind::If | TokenKind::While | TokenKind::Def => {
                    statements.push(self.compound_stmt()?);
                }
                _ => {
                    statements.push(self.simple_stmt()?);
                    if self.current.kind == TokenKind::Eof {
                        break;
                    }
                    self.eat(TokenKind::Newline)?;
                }
            }
        }
        Ok(statements)
    }

    /// simple_stmt := return_stmt | assignment_stmt | expr
    fn simple_stmt(&mut self) -> Result<Node, Error> {
        if self.current.kind == TokenKind::Return {
            self.bump()?;
            let value = self.expr()?;
            return Ok(Node::Return(Box::new(value)));
        }
        if self.current.kind == TokenKind::Name
            && let Ok(peeked) = self.lexer.peek()
            && peeked.kind == TokenKind::Equal
        {
            return self.assignment_stmt();
        }
        self.expr()
    }

    /// assignment_stmt := NAME '=' expr
    fn assignment_stmt(&mut self) -> Result<Node, Error> {
        let name = self.eat(TokenKind::Name)?;
        self.eat(TokenKind::Equal)?;
        let value = self.expr()?;
        Ok(Node::Assignment {
            target: name.text.into_owned(),
            value: Box::new(value),
        })
    }

    /// compound_stmt := if_stmt | while_stmt | funcdef_stmt
    fn compound_stmt(&mut self) -> Result<Node, Error> {
        match self.current.kind {
            TokenKind::While => self.while_stmt(),
            TokenKind::Def => self.funcdef_stmt(),
            _ => self.if_stmt(),
        }
    }

    /// if_stmt := IF expr ':' NEWLINE block ( elif_stmt | else_stmt )?
    fn if_stmt(&mut self) -> Result<Node, Error> {
        self.eat(TokenKind::If)?;
        let condition = self.expr()?;
        self.eat(TokenKind::Colon)?;
        self.eat(TokenKind::Newline)?;
        let body = self.block()?;
        let or_else = self.else_branch()?;
        Ok(Node::If {
            condition: Box::new(condition),
            body: Box::new(body),
            or_else,
        })
    }

    fn else_branch(&mut self) -> Result<Option<Box<Node>>, Error> {
        match self.current.kind {
            TokenKind::Elif => Ok(Some(Box::new(self.elif_stmt()?))),
            TokenKind::Else => Ok(Some(Box::new(self.else_stmt()?))),
            _ => Ok(None),
        }
    }

    /// elif_stmt := ELIF expr ':' NEWLINE block ( elif_stmt | else_stmt )?
    ///
    /// An `elif` chain desugars to a nested `If` in the else slot.
    fn elif_stmt(&mut self) -> Result<Node, Error> {
        self.eat(TokenKind::Elif)?;
        let condition = self.expr()?;
        self.eat(TokenKind::Colon)?;
        self.eat(TokenKind::Newline)?;
        let body = self.block()?;
        let or_else = self.else_branch()?;
        Ok(Node::If {
            condition: Box::new(condition),
            body: Box::new(body),
            or_else,
        })
    }

    /// else_stmt := ELSE ':' NEWLINE block
    fn else_stmt(&mut self) -> Result<Node, Error> {
        self.eat(TokenKind::Else)?;
        self.eat(TokenKind::Colon)?;
        self.eat(TokenKind::Newline)?;
        self.block()
    }

    /// while_stmt := WHILE expr ':' NEWLINE block
    fn while_stmt(&mut self) -> Result<Node, Error> {
        self.eat(TokenKind::While)?;
        let condition = self.expr()?;
        self.eat(TokenKind::Colon)?;
        self.eat(TokenKind::Newline)?;
        let body = self.block()?;
        Ok(Node::While {
            condition: Box::new(condition),
            body: Box::new(body),
        })
    }

    /// funcdef_stmt := DEF NAME '(' ( NAME ( ',' NAME )* )? ')' ':' NEWLINE block
    fn funcdef_stmt(&mut self) -> Result<Node, Error> {
        self.eat(TokenKind::Def)?;
        let name = self.eat(TokenKind::Name)?;
        self.eat(TokenKind::LParen)?;
        let mut parameters = Vec::new();
        if self.current.kind != TokenKind::RParen {
            parameters.push(self.eat(TokenKind::Name)?.text.into_owned());
            while self.current.kind == TokenKind::Comma {
                self.bump()?;
                parameters.push(self.eat(TokenKind::Name)?.text.into_owned());
            }
        }
        self.eat(TokenKind::RParen)?;
        self.eat(TokenKind::Colon)?;
        self.eat(TokenKind::Newline)?;
        let body = self.block()?;
        Ok(Node::FunctionDef {
            name: name.text.into_owned(),
            parameters,
            body: Box::new(body),
        })
    }

    /// block := INDENT statements DEDENT
    fn block(&mut self) -> Result<Node, Error> {
        self.eat(TokenKind::Indent)?;
        let statements = self.statements()?;
        self.eat(TokenKind::Dedent)?;
        Ok(Node::Block(statements))
    }

    /// expr := disjunction
    fn expr(&mut self) -> Result<Node, Error> {
        self.disjunction()
    }

    /// disjunction := conjunction ( OR conjunction )*
    fn disjunction(&mut self) -> Result<Node, Error> {
        let mut node = self.conjunction()?;
        while self.current.kind == TokenKind::Or {
            self.bump()?;
            let right = self.conjunction()?;
            node = Node::Binary {
                op: Op::Or,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    /// conjunction := inversion ( AND inversion )*
    fn conjunction(&mut self) -> Result<Node, Error> {
        let mut node = self.inversion()?;
        while self.current.kind == TokenKind::And {
            self.bump()?;
            let right = self.inversion()?;
            node = Node::Binary {
                op: Op::And,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    /// inversion := NOT inversion | comparison
    fn inversion(&mut self) -> Result<Node, Error> {
        if self.current.kind == TokenKind::Not {
            self.bump()?;
            let operand = self.inversion()?;
            return Ok(Node::Unary {
                op: Op::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    /// comparison := arith_expr ( (==|!=|<|<=|>|>=) arith_expr )*
    fn comparison(&mut self) -> Result<Node, Error> {
        let mut node = self.arith_expr()?;
        while let Some(op) = comparison_op(self.current.kind) {
            self.bump()?;
            let right = self.arith_expr()?;
            node = Node::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    /// arith_expr := term ( (+|-) term )*
    fn arith_expr(&mut self) -> Result<Node, Error> {
        let mut node = self.term()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => Op::Plus,
                TokenKind::Minus => Op::Minus,
                _ => break,
            };
            self.bump()?;
            let right = self.term()?;
            node = Node::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    /// term := factor ( (*|/|%) factor )*
    fn term(&mut self) -> Result<Node, Error> {
        let mut node = self.factor()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Mul => Op::Mul,
                TokenKind::Div => Op::Div,
                TokenKind::Mod => Op::Mod,
                _ => break,
            };
            self.bump()?;
            let right = self.factor()?;
            node = Node::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    /// factor := (+|-) factor | NUMBER | BOOLEAN | STRING
    ///         | NAME [ '(' arguments ')' ] | '(' expr ')'
    fn factor(&mut self) -> Result<Node, Error> {
        match self.current.kind {
            TokenKind::Plus => {
                self.bump()?;
                Ok(Node::Unary {
                    op: Op::Plus,
                    operand: Box::new(self.factor()?),
                })
            }
            TokenKind::Minus => {
                self.bump()?;
                Ok(Node::Unary {
                    op: Op::Minus,
                    operand: Box::new(self.factor()?),
                })
            }
            TokenKind::Number => {
                let token = self.eat(TokenKind::Number)?;
                Ok(Node::Number(token.text.into_owned()))
            }
            TokenKind::Boolean => {
                let token = self.eat(TokenKind::Boolean)?;
                Ok(Node::Boolean(token.text.into_owned()))
            }
            TokenKind::String => {
                let token = self.eat(TokenKind::String)?;
                Ok(Node::String(token.text.into_owned()))
            }
            TokenKind::Name => {
                let name = self.eat(TokenKind::Name)?;
                if self.current.kind == TokenKind::LParen {
                    return self.function_call(name.text.into_owned());
                }
                Ok(Node::Variable(name.text.into_owned()))
            }
            TokenKind::Print => {
                // `print` lexes as a keyword but resolves through the
                // builtin registry like any other called name
                let name = self.eat(TokenKind::Print)?;
                self.function_call(name.text.into_owned())
            }
            TokenKind::LParen => {
                self.bump()?;
                let node = self.expr()?;
                self.eat(TokenKind::RParen)?;
                Ok(node)
            }
            found => Err(self.unexpected(&format!("invalid factor, found {found}"))),
        }
    }

    /// arguments := ( expr ( ',' expr )* )?
    fn function_call(&mut self, name: String) -> Result<Node, Error> {
        self.eat(TokenKind::LParen)?;
        let mut arguments = Vec::new();
        if self.current.kind != TokenKind::RParen {
            arguments.push(self.expr()?);
            while self.current.kind == TokenKind::Comma {
                self.bump()?;
                arguments.push(self.expr()?);
            }
        }
        self.eat(TokenKind::RParen)?;
        Ok(Node::Call { name, arguments })
    }
}

fn comparison_op(kind: TokenKind) -> Option<Op> {
    match kind {
        TokenKind::EqEqual => Some(Op::EqEqual),
        TokenKind::NotEqual => Some(Op::NotEqual),
        TokenKind::Less => Some(Op::Less),
        TokenKind::LessEqual => Some(Op::LessEqual),
        TokenKind::Greater => Some(Op::Greater),
        TokenKind::GreaterEqual => Some(Op::GreaterEqual),
        _ => None,
    }
}
