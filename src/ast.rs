//! Query AST.
//!
//! A parsed query is an immutable tree of [`QueryNode`]s. Evaluation only ever borrows it,
//! so one tree can be evaluated any number of times, from any thread.

use std::fmt;

/// Defines the Abstract Syntax Tree (AST) for a parsed structured query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// `a AND b AND ...`, flattened so a long chain stays one level deep.
    And(Vec<QueryNode>),
    /// `a OR b OR ...`, flattened the same way.
    Or(Vec<QueryNode>),
    /// `NOT expression`.
    Not(Box<QueryNode>),
    /// `field <op> literal`, e.g. `level=error`.
    Comparison {
        field: FieldRef,
        operator: CompareOp,
        value: Literal,
    },
    /// `function(field, argument)`, e.g. `contains(message, "timeout")`.
    Function {
        field: FieldRef,
        function: FunctionName,
        argument: Argument,
    },
}

impl QueryNode {
    /// `left AND right`, appending to `left` when it already is a conjunction.
    pub fn and(left: QueryNode, right: QueryNode) -> Self {
        match left {
            QueryNode::And(mut terms) => {
                terms.push(right);
                QueryNode::And(terms)
            }
            left => QueryNode::And(vec![left, right]),
        }
    }

    /// `left OR right`, appending to `left` when it already is a disjunction.
    pub fn or(left: QueryNode, right: QueryNode) -> Self {
        match left {
            QueryNode::Or(mut terms) => {
                terms.push(right);
                QueryNode::Or(terms)
            }
            left => QueryNode::Or(vec![left, right]),
        }
    }

    pub fn negate(expression: QueryNode) -> Self {
        QueryNode::Not(Box::new(expression))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    pub fn parse(op: &str) -> Option<CompareOp> {
        let op = match op {
            "=" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            ">=" => CompareOp::Ge,
            "<=" => CompareOp::Le,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionName {
    Contains,
    StartsWith,
    EndsWith,
    Matches,
}

impl FunctionName {
    pub fn parse(name: &str) -> Option<FunctionName> {
        let f = match name {
            "contains" => FunctionName::Contains,
            "startsWith" => FunctionName::StartsWith,
            "endsWith" => FunctionName::EndsWith,
            "matches" => FunctionName::Matches,
            _ => return None,
        };
        Some(f)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionName::Contains => "contains",
            FunctionName::StartsWith => "startsWith",
            FunctionName::EndsWith => "endsWith",
            FunctionName::Matches => "matches",
        }
    }
}

/// A field reference; `name` may be a dotted path such as `req.method`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub name: String,
}

impl FieldRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

/// Right-hand side of a comparison, kept as written plus the type it was parsed as.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: String,
    pub value_type: ValueType,
}

impl Literal {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            value_type: ValueType::String,
        }
    }

    pub fn number(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            value_type: ValueType::Number,
        }
    }

    /// Classifies a bare (unquoted) word.
    pub fn bare(word: &str) -> Self {
        if word == "true" || word == "false" {
            Self {
                value: word.to_string(),
                value_type: ValueType::Boolean,
            }
        } else if word.parse::<f64>().is_ok_and(f64::is_finite) {
            Self::number(word)
        } else {
            Self::string(word)
        }
    }
}

/// Second argument of a function call.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Text(String),
    Regex { pattern: String, flags: String },
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::And(terms) => write_chain(f, terms, "AND"),
            QueryNode::Or(terms) => write_chain(f, terms, "OR"),
            QueryNode::Not(inner) => write!(f, "NOT {inner}"),
            QueryNode::Comparison {
                field,
                operator,
                value,
            } => match value.value_type {
                ValueType::String => write!(f, "{}{}{:?}", field.name, operator.as_str(), value.value),
                _ => write!(f, "{}{}{}", field.name, operator.as_str(), value.value),
            },
            QueryNode::Function {
                field,
                function,
                argument,
            } => match argument {
                Argument::Text(text) => write!(f, "{}({}, {:?})", function.as_str(), field.name, text),
                Argument::Regex { pattern, flags } => {
                    write!(f, "{}({}, /{}/{})", function.as_str(), field.name, pattern, flags)
                }
            },
        }
    }
}

fn write_chain(f: &mut fmt::Formatter<'_>, terms: &[QueryNode], op: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            write!(f, " {op} ")?;
        }
        write!(f, "{term}")?;
    }
    f.write_str(")")
}
