use crate::maze::Direction;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Parser recursion guard for program text.
const MAX_PARSE_NESTING: usize = 256;

/// A decision program. `Move` is the only terminal; the three function kinds
/// take exactly two owned children, so every node in memory is complete.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Move(Direction),
    IfWallNearby(Box<Node>, Box<Node>),
    IfGoalClose(Box<Node>, Box<Node>),
    Sequence(Box<Node>, Box<Node>),
}

/// The three arity-2 node kinds, used when a generator has to pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    IfWallNearby,
    IfGoalClose,
    Sequence,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 3] = [
        FunctionKind::IfWallNearby,
        FunctionKind::IfGoalClose,
        FunctionKind::Sequence,
    ];

    pub fn build(self, first: Node, second: Node) -> Node {
        let (first, second) = (Box::new(first), Box::new(second));
        match self {
            FunctionKind::IfWallNearby => Node::IfWallNearby(first, second),
            FunctionKind::IfGoalClose => Node::IfGoalClose(first, second),
            FunctionKind::Sequence => Node::Sequence(first, second),
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            FunctionKind::IfWallNearby => "IF_WALL",
            FunctionKind::IfGoalClose => "IF_GOAL",
            FunctionKind::Sequence => "SEQ",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        FunctionKind::ALL
            .into_iter()
            .find(|kind| kind.keyword() == keyword)
    }
}

impl Node {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Move(_))
    }

    /// Function kind of this node, `None` for a terminal.
    pub fn function_kind(&self) -> Option<FunctionKind> {
        match self {
            Node::Move(_) => None,
            Node::IfWallNearby(..) => Some(FunctionKind::IfWallNearby),
            Node::IfGoalClose(..) => Some(FunctionKind::IfGoalClose),
            Node::Sequence(..) => Some(FunctionKind::Sequence),
        }
    }

    pub fn children(&self) -> Option<(&Node, &Node)> {
        match self {
            Node::Move(_) => None,
            Node::IfWallNearby(a, b) | Node::IfGoalClose(a, b) | Node::Sequence(a, b) => {
                Some((a, b))
            }
        }
    }

    fn children_mut(&mut self) -> Option<(&mut Node, &mut Node)> {
        match self {
            Node::Move(_) => None,
            Node::IfWallNearby(a, b) | Node::IfGoalClose(a, b) | Node::Sequence(a, b) => {
                Some((a, b))
            }
        }
    }

    /// Total number of nodes, root included.
    pub fn size(&self) -> usize {
        match self.children() {
            None => 1,
            Some((a, b)) => 1 + a.size() + b.size(),
        }
    }

    /// Number of edges on the longest root-to-leaf path. A lone terminal has depth 0.
    pub fn depth(&self) -> usize {
        match self.children() {
            None => 0,
            Some((a, b)) => 1 + a.depth().max(b.depth()),
        }
    }

    /// Depth of every terminal, in preorder.
    pub fn leaf_depths(&self) -> Vec<usize> {
        fn walk(node: &Node, depth: usize, out: &mut Vec<usize>) {
            match node.children() {
                None => out.push(depth),
                Some((a, b)) => {
                    walk(a, depth + 1, out);
                    walk(b, depth + 1, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(self, 0, &mut out);
        out
    }

    /// Returns the subtree rooted at preorder position `index` (0 is the root).
    pub fn subtree(&self, index: usize) -> Option<&Node> {
        if index == 0 {
            return Some(self);
        }
        let (first, second) = self.children()?;
        let first_size = first.size();
        if index <= first_size {
            first.subtree(index - 1)
        } else {
            second.subtree(index - 1 - first_size)
        }
    }

    /// Mutable access to the subtree at preorder position `index`.
    pub fn subtree_mut(&mut self, index: usize) -> Option<&mut Node> {
        if index == 0 {
            return Some(self);
        }
        let (first, second) = self.children_mut()?;
        let first_size = first.size();
        if index <= first_size {
            first.subtree_mut(index - 1)
        } else {
            second.subtree_mut(index - 1 - first_size)
        }
    }

    /// Distance from the root to the node at preorder position `index`.
    pub fn depth_of(&self, index: usize) -> Option<usize> {
        if index == 0 {
            return Some(0);
        }
        let (first, second) = self.children()?;
        let first_size = first.size();
        let below = if index <= first_size {
            first.depth_of(index - 1)
        } else {
            second.depth_of(index - 1 - first_size)
        };
        below.map(|d| d + 1)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Move(direction) => write!(f, "MOVE({})", direction),
            Node::IfWallNearby(a, b) => write!(f, "IF_WALL({}, {})", a, b),
            Node::IfGoalClose(a, b) => write!(f, "IF_GOAL({}, {})", a, b),
            Node::Sequence(a, b) => write!(f, "SEQ({}, {})", a, b),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Unexpected character '{character}' at offset {offset}")]
    UnexpectedCharacter { offset: usize, character: char },
    #[error("Unexpected end of program text")]
    UnexpectedEnd,
    #[error("Expected {expected} at offset {offset}, found '{found}'")]
    UnexpectedToken {
        offset: usize,
        expected: &'static str,
        found: String,
    },
    #[error("Unknown node keyword '{0}'")]
    UnknownKeyword(String),
    #[error("Unknown direction '{0}'")]
    UnknownDirection(String),
    #[error("{keyword} at offset {offset} is missing a child")]
    MissingChild { keyword: String, offset: usize },
    #[error("Trailing input at offset {0}")]
    TrailingInput(usize),
    #[error("Program nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Open,
    Close,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => name.clone(),
            Token::Open => "(".to_string(),
            Token::Close => ")".to_string(),
            Token::Comma => ",".to_string(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' => {
                chars.next();
                let token = match c {
                    '(' => Token::Open,
                    ')' => Token::Close,
                    _ => Token::Comma,
                };
                tokens.push((offset, token));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c.to_ascii_uppercase());
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((offset, Token::Ident(ident)));
            }
            character => return Err(ParseError::UnexpectedCharacter { offset, character }),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Result<(usize, Token), ParseError> {
        let token = self.peek().cloned().ok_or(ParseError::UnexpectedEnd)?;
        self.cursor += 1;
        Ok(token)
    }

    fn expect(&mut self, wanted: Token, expected: &'static str) -> Result<(), ParseError> {
        let (offset, token) = self.next()?;
        if token == wanted {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                offset,
                expected,
                found: token.describe(),
            })
        }
    }

    fn node(&mut self, nesting: usize) -> Result<Node, ParseError> {
        if nesting > MAX_PARSE_NESTING {
            return Err(ParseError::NestingTooDeep(MAX_PARSE_NESTING));
        }
        let (offset, token) = self.next()?;
        let keyword = match token {
            Token::Ident(keyword) => keyword,
            other => {
                return Err(ParseError::UnexpectedToken {
                    offset,
                    expected: "a node keyword",
                    found: other.describe(),
                });
            }
        };

        if keyword == "MOVE" {
            self.expect(Token::Open, "'('")?;
            let (offset, token) = self.next()?;
            let direction = match token {
                Token::Ident(name) => {
                    Direction::from_name(&name).ok_or(ParseError::UnknownDirection(name))?
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        offset,
                        expected: "a direction",
                        found: other.describe(),
                    });
                }
            };
            self.expect(Token::Close, "')'")?;
            return Ok(Node::Move(direction));
        }

        let kind =
            FunctionKind::from_keyword(&keyword).ok_or(ParseError::UnknownKeyword(keyword.clone()))?;
        self.expect(Token::Open, "'('")?;
        let first = self.child(&keyword, offset, nesting)?;
        match self.next()? {
            (_, Token::Comma) => {}
            (_, Token::Close) => return Err(ParseError::MissingChild { keyword, offset }),
            (offset, other) => {
                return Err(ParseError::UnexpectedToken {
                    offset,
                    expected: "','",
                    found: other.describe(),
                });
            }
        }
        let second = self.child(&keyword, offset, nesting)?;
        self.expect(Token::Close, "')'")?;
        Ok(kind.build(first, second))
    }

    fn child(&mut self, keyword: &str, offset: usize, nesting: usize) -> Result<Node, ParseError> {
        match self.peek() {
            Some((_, Token::Close)) | Some((_, Token::Comma)) => Err(ParseError::MissingChild {
                keyword: keyword.to_string(),
                offset,
            }),
            _ => self.node(nesting + 1),
        }
    }
}

impl FromStr for Node {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            tokens: tokenize(text)?,
            cursor: 0,
        };
        let node = parser.node(0)?;
        match parser.peek() {
            None => Ok(node),
            Some((offset, _)) => Err(ParseError::TrailingInput(*offset)),
        }
    }
}
