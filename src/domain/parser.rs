//! Expression parser for the native fallback evaluation tier.
//!
//! This module implements a recursive descent parser for metric formulas
//! based on a formal BNF grammar. It is the last-resort evaluation backend:
//! a restricted evaluator with access only to the caller-supplied parameter
//! binding and a fixed registry of safe math functions, never to arbitrary
//! host state.
//!
//! # BNF Grammar
//!
//! The parser implements the following BNF grammar for expressions:
//!
//! ```bnf
//! Expression     ::= Disjunction
//! Disjunction    ::= Conjunction ( "|" Conjunction )*
//! Conjunction    ::= Equality ( "&" Equality )*
//! Equality       ::= Comparison ( ( "==" | "=" | "!=" | "<>" ) Comparison )*
//! Comparison     ::= Addition ( ( "<" | "<=" | ">" | ">=" ) Addition )*
//! Addition       ::= Multiplication ( ( "+" | "-" ) Multiplication )*
//! Multiplication ::= Power ( ( "*" | "/" | "%" ) Power )*
//! Power          ::= Unary ( ( "**" | "^" ) Unary )*
//! Unary          ::= ( "+" | "-" | "~" | "!" )? Primary
//! Primary        ::= Number | Variable | FunctionCall | "(" Expression ")"
//! FunctionCall   ::= Identifier "(" ArgumentList? ")"
//! ArgumentList   ::= Expression ( "," Expression )*
//! Variable       ::= Identifier
//! Number         ::= [0-9]+ ( "." [0-9]+ )? ( ("e"|"E") ("+"|"-")? [0-9]+ )?
//! Identifier     ::= [a-zA-Z_][a-zA-Z0-9_]*
//! ```
//!
//! Precedence follows the grammar: boolean disjunction binds loosest, then
//! conjunction, equality, comparison, arithmetic, and power (which is
//! right-associative). Boolean values are represented as 1.0/0.0 throughout,
//! so comparisons and boolean operators compose with arithmetic freely.

use std::collections::HashMap;

/// Represents a token in the expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    Identifier(String),

    // Operators
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Power,

    // Comparison operators
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    NotEqual,
    Equal,

    // Boolean operators
    And,
    Or,
    Not,

    // Delimiters
    LeftParen,
    RightParen,
    Comma,

    // End of input
    Eof,
}

/// Represents an Abstract Syntax Tree node for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),

    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },

    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },

    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
}

/// Binary operators with their precedence and evaluation behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    // Boolean
    And,
    Or,

    // Equality
    Equal,
    NotEqual,

    // Comparison
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Power (highest precedence among binary)
    Power,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

/// Lexical analyzer for tokenizing expressions.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    /// Creates a new lexer for the given input string.
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    /// Advances to the next character in the input.
    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    /// Skips whitespace characters.
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Reads a number token: integer, decimal, or exponent notation.
    fn read_number(&mut self) -> Result<f64, String> {
        let mut number_str = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                number_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if self.current_char == Some('.') {
            number_str.push('.');
            self.advance();

            while let Some(ch) = self.current_char {
                if ch.is_ascii_digit() {
                    number_str.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        // Exponent notation: constants substituted into formulas may be
        // rendered as e.g. 1e-7.
        if let Some(marker @ ('e' | 'E')) = self.current_char {
            let sign = match self.input.get(self.position + 1) {
                Some(ch @ ('+' | '-')) => Some(*ch),
                _ => None,
            };
            let digits_at = self.position + 1 + usize::from(sign.is_some());

            if self
                .input
                .get(digits_at)
                .is_some_and(|ch| ch.is_ascii_digit())
            {
                number_str.push(marker);
                self.advance();
                if let Some(sign) = sign {
                    number_str.push(sign);
                    self.advance();
                }
                while let Some(ch) = self.current_char {
                    if ch.is_ascii_digit() {
                        number_str.push(ch);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        number_str
            .parse::<f64>()
            .map_err(|_| format!("Invalid number: {}", number_str))
    }

    /// Reads an identifier (function name or parameter name).
    fn read_identifier(&mut self) -> String {
        let mut identifier = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        identifier
    }

    /// Gets the next token from the input.
    pub fn next_token(&mut self) -> Result<Token, String> {
        self.skip_whitespace();

        match self.current_char {
            None => Ok(Token::Eof),

            Some(ch) => match ch {
                '0'..='9' => {
                    let number = self.read_number()?;
                    Ok(Token::Number(number))
                }

                'a'..='z' | 'A'..='Z' | '_' => {
                    let identifier = self.read_identifier();
                    Ok(Token::Identifier(identifier))
                }

                '+' => {
                    self.advance();
                    Ok(Token::Plus)
                }

                '-' => {
                    self.advance();
                    Ok(Token::Minus)
                }

                '*' => {
                    self.advance();
                    if self.current_char == Some('*') {
                        self.advance();
                        Ok(Token::Power)
                    } else {
                        Ok(Token::Multiply)
                    }
                }

                '/' => {
                    self.advance();
                    Ok(Token::Divide)
                }

                '%' => {
                    self.advance();
                    Ok(Token::Modulo)
                }

                '^' => {
                    self.advance();
                    Ok(Token::Power)
                }

                '<' => {
                    self.advance();
                    match self.current_char {
                        Some('=') => {
                            self.advance();
                            Ok(Token::LessEqual)
                        }
                        Some('>') => {
                            self.advance();
                            Ok(Token::NotEqual)
                        }
                        _ => Ok(Token::Less),
                    }
                }

                '>' => {
                    self.advance();
                    if self.current_char == Some('=') {
                        self.advance();
                        Ok(Token::GreaterEqual)
                    } else {
                        Ok(Token::Greater)
                    }
                }

                '=' => {
                    self.advance();
                    if self.current_char == Some('=') {
                        self.advance();
                    }
                    Ok(Token::Equal)
                }

                '!' => {
                    self.advance();
                    if self.current_char == Some('=') {
                        self.advance();
                        Ok(Token::NotEqual)
                    } else {
                        Ok(Token::Not)
                    }
                }

                '~' => {
                    self.advance();
                    Ok(Token::Not)
                }

                '&' => {
                    self.advance();
                    if self.current_char == Some('&') {
                        self.advance();
                    }
                    Ok(Token::And)
                }

                '|' => {
                    self.advance();
                    if self.current_char == Some('|') {
                        self.advance();
                    }
                    Ok(Token::Or)
                }

                '(' => {
                    self.advance();
                    Ok(Token::LeftParen)
                }

                ')' => {
                    self.advance();
                    Ok(Token::RightParen)
                }

                ',' => {
                    self.advance();
                    Ok(Token::Comma)
                }

                _ => Err(format!("Unexpected character: '{}'", ch)),
            },
        }
    }
}

/// Function signature for registered math functions.
pub type FunctionImpl = fn(&[f64]) -> Result<f64, String>;

/// Registry of the safe math functions available to formulas.
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionImpl>,
}

fn one_arg(args: &[f64], name: &str) -> Result<f64, String> {
    if args.len() != 1 {
        Err(format!("{} requires exactly 1 argument", name))
    } else {
        Ok(args[0])
    }
}

fn two_args(args: &[f64], name: &str) -> Result<(f64, f64), String> {
    if args.len() != 2 {
        Err(format!("{} requires exactly 2 arguments", name))
    } else {
        Ok((args[0], args[1]))
    }
}

impl FunctionRegistry {
    /// Creates a new function registry with built-in functions.
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };

        registry.register_builtin_functions();
        registry
    }

    /// Registers a new function in the registry.
    pub fn register_function(&mut self, name: &str, func: FunctionImpl) {
        self.functions.insert(name.to_lowercase(), func);
    }

    /// Gets a function by name.
    pub fn get_function(&self, name: &str) -> Option<&FunctionImpl> {
        self.functions.get(&name.to_lowercase())
    }

    /// Registers all built-in math functions.
    fn register_builtin_functions(&mut self) {
        self.register_function("sin", |args| Ok(one_arg(args, "sin")?.sin()));
        self.register_function("cos", |args| Ok(one_arg(args, "cos")?.cos()));
        self.register_function("tan", |args| Ok(one_arg(args, "tan")?.tan()));
        self.register_function("sinh", |args| Ok(one_arg(args, "sinh")?.sinh()));
        self.register_function("cosh", |args| Ok(one_arg(args, "cosh")?.cosh()));
        self.register_function("tanh", |args| Ok(one_arg(args, "tanh")?.tanh()));
        self.register_function("arcsin", |args| Ok(one_arg(args, "arcsin")?.asin()));
        self.register_function("arccos", |args| Ok(one_arg(args, "arccos")?.acos()));
        self.register_function("arctan", |args| Ok(one_arg(args, "arctan")?.atan()));
        self.register_function("exp", |args| Ok(one_arg(args, "exp")?.exp()));
        self.register_function("ln", |args| Ok(one_arg(args, "ln")?.ln()));
        self.register_function("log10", |args| Ok(one_arg(args, "log10")?.log10()));
        self.register_function("abs", |args| Ok(one_arg(args, "abs")?.abs()));
        self.register_function("floor", |args| Ok(one_arg(args, "floor")?.floor()));
        self.register_function("ceil", |args| Ok(one_arg(args, "ceil")?.ceil()));

        self.register_function("sqrt", |args| {
            let x = one_arg(args, "sqrt")?;
            if x < 0.0 {
                Err("sqrt of negative number".to_string())
            } else {
                Ok(x.sqrt())
            }
        });

        self.register_function("power", |args| {
            let (base, exponent) = two_args(args, "power")?;
            Ok(base.powf(exponent))
        });

        self.register_function("min", |args| {
            args.iter()
                .fold(None, |acc: Option<f64>, &x| Some(acc.map_or(x, |a| a.min(x))))
                .ok_or_else(|| "min requires at least one argument".to_string())
        });

        self.register_function("max", |args| {
            args.iter()
                .fold(None, |acc: Option<f64>, &x| Some(acc.map_or(x, |a| a.max(x))))
                .ok_or_else(|| "max requires at least one argument".to_string())
        });

        self.register_function("round", |args| match args.len() {
            1 => Ok(args[0].round()),
            2 => {
                let places = args[1] as i32;
                let multiplier = 10f64.powi(places);
                Ok((args[0] * multiplier).round() / multiplier)
            }
            _ => Err("round requires 1 or 2 arguments".to_string()),
        });

        self.register_function("if", |args| {
            if args.len() != 3 {
                Err("if requires exactly 3 arguments".to_string())
            } else {
                Ok(if args[0] != 0.0 { args[1] } else { args[2] })
            }
        });

        // Function forms of the boolean operators.
        self.register_function("and", |args| {
            Ok(if args.iter().all(|&x| x != 0.0) { 1.0 } else { 0.0 })
        });

        self.register_function("or", |args| {
            Ok(if args.iter().any(|&x| x != 0.0) { 1.0 } else { 0.0 })
        });

        self.register_function("not", |args| {
            let x = one_arg(args, "not")?;
            Ok(if x == 0.0 { 1.0 } else { 0.0 })
        });
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursive descent parser for metric formulas.
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    /// Creates a new parser for the given expression.
    pub fn new(input: &str) -> Result<Self, String> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;

        Ok(Self {
            lexer,
            current_token,
        })
    }

    /// Advances to the next token.
    fn advance(&mut self) -> Result<(), String> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    /// Checks if the current token matches the expected token and advances.
    fn expect(&mut self, expected: Token) -> Result<(), String> {
        if std::mem::discriminant(&self.current_token) == std::mem::discriminant(&expected) {
            self.advance()
        } else {
            Err(format!(
                "Expected {:?}, found {:?}",
                expected, self.current_token
            ))
        }
    }

    /// Parses the top-level expression.
    pub fn parse(&mut self) -> Result<Expr, String> {
        let expr = self.parse_disjunction()?;

        if self.current_token != Token::Eof {
            return Err(format!("Unexpected token at end: {:?}", self.current_token));
        }

        Ok(expr)
    }

    /// Parses boolean disjunction expressions.
    fn parse_disjunction(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_conjunction()?;

        while self.current_token == Token::Or {
            self.advance()?;
            let right = self.parse_conjunction()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: BinaryOp::Or,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses boolean conjunction expressions.
    fn parse_conjunction(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_equality()?;

        while self.current_token == Token::And {
            self.advance()?;
            let right = self.parse_equality()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: BinaryOp::And,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses equality expressions.
    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_comparison()?;

        while matches!(self.current_token, Token::Equal | Token::NotEqual) {
            let op = match self.current_token {
                Token::Equal => BinaryOp::Equal,
                Token::NotEqual => BinaryOp::NotEqual,
                _ => unreachable!(),
            };
            self.advance()?;
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses comparison expressions.
    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_addition()?;

        while matches!(
            self.current_token,
            Token::Less | Token::LessEqual | Token::Greater | Token::GreaterEqual
        ) {
            let op = match self.current_token {
                Token::Less => BinaryOp::Less,
                Token::LessEqual => BinaryOp::LessEqual,
                Token::Greater => BinaryOp::Greater,
                Token::GreaterEqual => BinaryOp::GreaterEqual,
                _ => unreachable!(),
            };
            self.advance()?;
            let right = self.parse_addition()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses addition and subtraction expressions.
    fn parse_addition(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplication()?;

        while matches!(self.current_token, Token::Plus | Token::Minus) {
            let op = match self.current_token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Subtract,
                _ => unreachable!(),
            };
            self.advance()?;
            let right = self.parse_multiplication()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses multiplication, division, and modulo expressions.
    fn parse_multiplication(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_power()?;

        while matches!(
            self.current_token,
            Token::Multiply | Token::Divide | Token::Modulo
        ) {
            let op = match self.current_token {
                Token::Multiply => BinaryOp::Multiply,
                Token::Divide => BinaryOp::Divide,
                Token::Modulo => BinaryOp::Modulo,
                _ => unreachable!(),
            };
            self.advance()?;
            let right = self.parse_power()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses power expressions (right-associative).
    fn parse_power(&mut self) -> Result<Expr, String> {
        let left = self.parse_unary()?;

        if self.current_token == Token::Power {
            self.advance()?;
            let right = self.parse_power()?; // Right-associative
            Ok(Expr::Binary {
                left: Box::new(left),
                operator: BinaryOp::Power,
                right: Box::new(right),
            })
        } else {
            Ok(left)
        }
    }

    /// Parses unary expressions.
    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.current_token {
            Token::Plus => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    operator: UnaryOp::Plus,
                    operand: Box::new(operand),
                })
            }
            Token::Minus => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    operator: UnaryOp::Minus,
                    operand: Box::new(operand),
                })
            }
            Token::Not => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    operator: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_primary(),
        }
    }

    /// Parses primary expressions (highest precedence).
    fn parse_primary(&mut self) -> Result<Expr, String> {
        match &self.current_token {
            Token::Number(value) => {
                let value = *value;
                self.advance()?;
                Ok(Expr::Number(value))
            }

            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;

                if self.current_token == Token::LeftParen {
                    self.advance()?;
                    let args = self.parse_argument_list()?;
                    self.expect(Token::RightParen)?;
                    Ok(Expr::FunctionCall { name, args })
                } else {
                    Ok(Expr::Variable(name))
                }
            }

            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_disjunction()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }

            _ => Err(format!("Unexpected token: {:?}", self.current_token)),
        }
    }

    /// Parses function argument lists.
    fn parse_argument_list(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();

        if self.current_token == Token::RightParen {
            return Ok(args);
        }

        args.push(self.parse_disjunction()?);

        while self.current_token == Token::Comma {
            self.advance()?;
            args.push(self.parse_disjunction()?);
        }

        Ok(args)
    }
}

/// Expression evaluator that walks the AST and computes results.
pub struct ExpressionEvaluator<'a> {
    binding: &'a HashMap<String, f64>,
    function_registry: &'a FunctionRegistry,
}

impl<'a> ExpressionEvaluator<'a> {
    /// Creates a new expression evaluator over a parameter binding.
    pub fn new(binding: &'a HashMap<String, f64>, function_registry: &'a FunctionRegistry) -> Self {
        Self {
            binding,
            function_registry,
        }
    }

    /// Evaluates an expression AST to a numeric result.
    pub fn evaluate(&self, expr: &Expr) -> Result<f64, String> {
        match expr {
            Expr::Number(value) => Ok(*value),

            Expr::Variable(name) => self
                .binding
                .get(name)
                .copied()
                .ok_or_else(|| format!("Undefined variable: {}", name)),

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left_val = self.evaluate(left)?;
                let right_val = self.evaluate(right)?;

                match operator {
                    BinaryOp::Add => Ok(left_val + right_val),
                    BinaryOp::Subtract => Ok(left_val - right_val),
                    BinaryOp::Multiply => Ok(left_val * right_val),
                    BinaryOp::Divide => {
                        if right_val == 0.0 {
                            Err("Division by zero".to_string())
                        } else {
                            Ok(left_val / right_val)
                        }
                    }
                    BinaryOp::Modulo => {
                        if right_val == 0.0 {
                            Err("Modulo by zero".to_string())
                        } else {
                            Ok(left_val % right_val)
                        }
                    }
                    BinaryOp::Power => Ok(left_val.powf(right_val)),
                    BinaryOp::Less => Ok(if left_val < right_val { 1.0 } else { 0.0 }),
                    BinaryOp::LessEqual => Ok(if left_val <= right_val { 1.0 } else { 0.0 }),
                    BinaryOp::Greater => Ok(if left_val > right_val { 1.0 } else { 0.0 }),
                    BinaryOp::GreaterEqual => Ok(if left_val >= right_val { 1.0 } else { 0.0 }),
                    BinaryOp::Equal => Ok(if left_val == right_val { 1.0 } else { 0.0 }),
                    BinaryOp::NotEqual => Ok(if left_val != right_val { 1.0 } else { 0.0 }),
                    BinaryOp::And => Ok(if left_val != 0.0 && right_val != 0.0 {
                        1.0
                    } else {
                        0.0
                    }),
                    BinaryOp::Or => Ok(if left_val != 0.0 || right_val != 0.0 {
                        1.0
                    } else {
                        0.0
                    }),
                }
            }

            Expr::Unary { operator, operand } => {
                let operand_val = self.evaluate(operand)?;

                match operator {
                    UnaryOp::Plus => Ok(operand_val),
                    UnaryOp::Minus => Ok(-operand_val),
                    UnaryOp::Not => Ok(if operand_val == 0.0 { 1.0 } else { 0.0 }),
                }
            }

            Expr::FunctionCall { name, args } => {
                let func = self
                    .function_registry
                    .get_function(name)
                    .ok_or_else(|| format!("Unknown function: {}", name))?;

                let arg_values: Result<Vec<f64>, String> =
                    args.iter().map(|arg| self.evaluate(arg)).collect();
                func(&arg_values?)
            }
        }
    }
}
