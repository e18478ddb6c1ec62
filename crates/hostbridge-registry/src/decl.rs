//! Declaration-string parser for registering host members.
//!
//! Grammar (whitespace-insensitive):
//!
//! ```text
//! method      := ['static'] type IDENT [generics] '(' params ')'
//! constructor := [IDENT] '(' params ')'
//! delegate    := type [IDENT] '(' params ')'
//! field       := ['static'] type IDENT
//! generics    := '<' IDENT (',' IDENT)* '>'
//! params      := [param (',' param)*]
//! param       := ['ref' | 'out' | 'params'] type [IDENT] ['=' literal]
//! type        := IDENT ('.' IDENT)* ['?'] ('[' ']')*
//! literal     := ['-'] NUMBER | STRING | 'true' | 'false' | 'null'
//! ```
//!
//! Type names `bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 string object void
//! function table userdata` are built in; any other (dotted) name refers to a
//! registered host type by its qualified name.

use hostbridge_core::{HostValue, Param, PrimitiveKind, RegistrationError, Signature, TypeRef};

/// A parsed method declaration.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub is_static: bool,
    pub signature: Signature,
}

/// A parsed field or property declaration.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Punct(char),
}

fn lex(decl: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = decl.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
        } else if c.is_ascii_digit() {
            let mut number = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' {
                    number.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Number(number));
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => text.push(other),
                        None => return Err("unterminated string literal".into()),
                    },
                    Some(other) => text.push(other),
                    None => return Err("unterminated string literal".into()),
                }
            }
            tokens.push(Token::Str(text));
        } else if "()<>[],.?=-".contains(c) {
            tokens.push(Token::Punct(c));
            chars.next();
        } else {
            return Err(format!("unexpected character '{c}'"));
        }
    }
    Ok(tokens)
}

struct Parser<'d> {
    decl: &'d str,
    tokens: Vec<Token>,
    pos: usize,
    generics: Vec<String>,
}

impl<'d> Parser<'d> {
    fn new(decl: &'d str) -> Result<Self, RegistrationError> {
        let tokens = lex(decl).map_err(|reason| RegistrationError::InvalidDeclaration {
            decl: decl.to_owned(),
            reason,
        })?;
        let generics = scan_generics(&tokens);
        Ok(Self {
            decl,
            tokens,
            pos: 0,
            generics,
        })
    }

    fn error(&self, reason: impl Into<String>) -> RegistrationError {
        RegistrationError::InvalidDeclaration {
            decl: self.decl.to_owned(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.at_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), RegistrationError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, RegistrationError> {
        match self.peek() {
            Some(Token::Ident(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn finish(&self) -> Result<(), RegistrationError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected trailing {token:?}"))),
        }
    }

    fn parse_type(&mut self) -> Result<TypeRef, RegistrationError> {
        let mut name = self.ident()?;
        while self.at_punct('.') {
            self.pos += 1;
            name.push('.');
            name.push_str(&self.ident()?);
        }

        let mut ty = self.resolve_type_name(&name);
        if self.eat_punct('?') {
            ty = TypeRef::nullable(ty);
        }
        while self.at_punct('[') {
            self.pos += 1;
            self.expect_punct(']')?;
            ty = TypeRef::array(ty);
        }
        Ok(ty)
    }

    fn resolve_type_name(&self, name: &str) -> TypeRef {
        if let Some(kind) = PrimitiveKind::from_name(name) {
            return TypeRef::Primitive(kind);
        }
        match name {
            "void" => TypeRef::Void,
            "string" => TypeRef::String,
            "object" => TypeRef::Object,
            "function" => TypeRef::Function,
            "table" => TypeRef::Table,
            "userdata" => TypeRef::UserData,
            _ if self.generics.iter().any(|g| g == name) => TypeRef::Generic(name.to_owned()),
            _ => TypeRef::named(name),
        }
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, RegistrationError> {
        self.expect_punct('(')?;
        let mut params = Vec::new();
        if self.eat_punct(')') {
            return Ok(params);
        }
        loop {
            params.push(self.parse_param(params.len())?);
            if self.eat_punct(')') {
                break;
            }
            self.expect_punct(',')?;
        }

        let variadic = params.iter().position(|p| p.variadic);
        if variadic.is_some_and(|i| i + 1 != params.len()) {
            return Err(self.error("'params' must be the last parameter"));
        }
        Ok(params)
    }

    fn parse_param(&mut self, position: usize) -> Result<Param, RegistrationError> {
        let is_ref = self.eat_keyword("ref");
        let is_out = !is_ref && self.eat_keyword("out");
        let is_variadic = !is_ref && !is_out && self.eat_keyword("params");

        let ty = self.parse_type()?;
        let name = match self.peek() {
            Some(Token::Ident(_)) => self.ident()?,
            _ => format!("arg{position}"),
        };

        let mut param = Param::new(name, ty);
        if self.eat_punct('=') {
            let default = self.parse_literal(&param.ty)?;
            param = param.with_default(default);
        }
        if is_ref {
            param = param.by_ref();
        } else if is_out {
            param = param.out();
        } else if is_variadic {
            param = param.variadic();
        }
        Ok(param)
    }

    fn parse_literal(&mut self, ty: &TypeRef) -> Result<HostValue, RegistrationError> {
        let negative = self.eat_punct('-');
        let token = self.peek().cloned().ok_or_else(|| self.error("expected default value"))?;
        self.pos += 1;

        match token {
            Token::Number(text) => {
                let text = if negative { format!("-{text}") } else { text };
                self.number_literal(&text, ty)
            }
            Token::Str(text) if !negative => Ok(HostValue::String(text)),
            Token::Ident(word) if !negative => match word.as_str() {
                "true" => Ok(HostValue::Bool(true)),
                "false" => Ok(HostValue::Bool(false)),
                "null" => Ok(HostValue::Null),
                _ => Err(self.error(format!("invalid default value '{word}'"))),
            },
            _ => Err(self.error("invalid default value")),
        }
    }

    fn number_literal(&self, text: &str, ty: &TypeRef) -> Result<HostValue, RegistrationError> {
        let invalid = || self.error(format!("invalid numeric default '{text}'"));
        let kind = match ty {
            TypeRef::Primitive(kind) if kind.is_numeric() => *kind,
            TypeRef::Nullable(inner) => match **inner {
                TypeRef::Primitive(kind) if kind.is_numeric() => kind,
                _ => PrimitiveKind::F64,
            },
            _ => PrimitiveKind::F64,
        };
        if kind.is_float() {
            let v: f64 = text.parse().map_err(|_| invalid())?;
            return Ok(match kind {
                PrimitiveKind::F32 => HostValue::F32(v as f32),
                _ => HostValue::F64(v),
            });
        }
        let v: i128 = text.parse().map_err(|_| invalid())?;
        let value = match kind {
            PrimitiveKind::I8 => i8::try_from(v).map(HostValue::I8).ok(),
            PrimitiveKind::I16 => i16::try_from(v).map(HostValue::I16).ok(),
            PrimitiveKind::I32 => i32::try_from(v).map(HostValue::I32).ok(),
            PrimitiveKind::I64 => i64::try_from(v).map(HostValue::I64).ok(),
            PrimitiveKind::U8 => u8::try_from(v).map(HostValue::U8).ok(),
            PrimitiveKind::U16 => u16::try_from(v).map(HostValue::U16).ok(),
            PrimitiveKind::U32 => u32::try_from(v).map(HostValue::U32).ok(),
            PrimitiveKind::U64 => u64::try_from(v).map(HostValue::U64).ok(),
            _ => None,
        };
        value.ok_or_else(invalid)
    }
}

/// Names declared in a `name<A, B>(` generic list, if any.
fn scan_generics(tokens: &[Token]) -> Vec<String> {
    let Some(open_paren) = tokens.iter().position(|t| *t == Token::Punct('(')) else {
        return Vec::new();
    };
    if open_paren == 0 || tokens[open_paren - 1] != Token::Punct('>') {
        return Vec::new();
    }
    let Some(open_angle) = tokens[..open_paren].iter().rposition(|t| *t == Token::Punct('<')) else {
        return Vec::new();
    };
    tokens[open_angle + 1..open_paren - 1]
        .iter()
        .filter_map(|t| match t {
            Token::Ident(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Parse `['static'] ret name[<T>](params)`.
pub fn parse_method(decl: &str) -> Result<MethodDecl, RegistrationError> {
    let mut p = Parser::new(decl)?;
    let is_static = p.eat_keyword("static");
    let return_type = p.parse_type()?;
    let name = p.ident()?;
    if p.eat_punct('<') {
        loop {
            p.ident()?;
            if p.eat_punct('>') {
                break;
            }
            p.expect_punct(',')?;
        }
    }
    let params = p.parse_params()?;
    p.finish()?;

    let mut signature = Signature::new(params, return_type);
    signature.generics = p.generics.clone();
    Ok(MethodDecl {
        name,
        is_static,
        signature,
    })
}

/// Parse `[name](params)`; the return type is the constructed type.
pub fn parse_constructor(decl: &str, constructed: TypeRef) -> Result<Signature, RegistrationError> {
    let mut p = Parser::new(decl)?;
    if matches!(p.peek(), Some(Token::Ident(_))) {
        p.ident()?;
    }
    let params = p.parse_params()?;
    p.finish()?;
    Ok(Signature::new(params, constructed))
}

/// Parse `ret [name](params)` describing a delegate's invoke signature.
pub fn parse_delegate(decl: &str) -> Result<Signature, RegistrationError> {
    let mut p = Parser::new(decl)?;
    let return_type = p.parse_type()?;
    if matches!(p.peek(), Some(Token::Ident(_))) && matches!(p.peek_at(1), Some(Token::Punct('('))) {
        p.ident()?;
    }
    let params = p.parse_params()?;
    p.finish()?;
    Ok(Signature::new(params, return_type))
}

/// Parse `['static'] type name`.
pub fn parse_field(decl: &str) -> Result<FieldDecl, RegistrationError> {
    let mut p = Parser::new(decl)?;
    let is_static = p.eat_keyword("static");
    let ty = p.parse_type()?;
    let name = p.ident()?;
    p.finish()?;
    Ok(FieldDecl { name, ty, is_static })
}

/// Parse a bare type.
pub fn parse_type(decl: &str) -> Result<TypeRef, RegistrationError> {
    let mut p = Parser::new(decl)?;
    let ty = p.parse_type()?;
    p.finish()?;
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_core::ParamDirection;

    const I32: TypeRef = TypeRef::Primitive(PrimitiveKind::I32);

    #[test]
    fn simple_method() {
        let m = parse_method("i32 add(i32 a, i32 b)").unwrap();
        assert_eq!(m.name, "add");
        assert!(!m.is_static);
        assert_eq!(m.signature.return_type, I32);
        assert_eq!(m.signature.params.len(), 2);
        assert_eq!(m.signature.params[1].name, "b");
    }

    #[test]
    fn static_method_with_qualified_types() {
        let m = parse_method("static Demo.Point origin()").unwrap();
        assert!(m.is_static);
        assert_eq!(m.signature.return_type, TypeRef::named("Demo.Point"));
        assert!(m.signature.params.is_empty());
    }

    #[test]
    fn ref_out_params() {
        let m = parse_method("bool tryParse(string text, out i32 value, ref i32 count)").unwrap();
        let params = &m.signature.params;
        assert_eq!(params[0].direction, ParamDirection::In);
        assert_eq!(params[1].direction, ParamDirection::Out);
        assert_eq!(params[1].ty, TypeRef::by_ref(I32));
        assert_eq!(params[2].direction, ParamDirection::Ref);
        assert_eq!(m.signature.result_count(), 3);
    }

    #[test]
    fn defaults_are_typed() {
        let m = parse_method("void f(i32 a = 5, f64 b = -1.5, string s = \"x\", bool on = true, object o = null)").unwrap();
        let defaults: Vec<_> = m.signature.params.iter().map(|p| p.default.clone()).collect();
        assert_eq!(
            defaults,
            vec![
                Some(HostValue::I32(5)),
                Some(HostValue::F64(-1.5)),
                Some(HostValue::String("x".into())),
                Some(HostValue::Bool(true)),
                Some(HostValue::Null),
            ]
        );
    }

    #[test]
    fn out_of_range_default_is_rejected() {
        assert!(parse_method("void f(u8 a = 300)").is_err());
    }

    #[test]
    fn variadic_must_be_last() {
        let m = parse_method("string join(string sep, params string parts)").unwrap();
        assert!(m.signature.params[1].variadic);
        assert_eq!(m.signature.params[1].ty, TypeRef::array(TypeRef::String));
        assert!(parse_method("void f(params i32 a, i32 b)").is_err());
    }

    #[test]
    fn generic_method() {
        let m = parse_method("T first<T>(T[] items)").unwrap();
        assert_eq!(m.signature.generics, vec!["T".to_owned()]);
        assert_eq!(m.signature.return_type, TypeRef::Generic("T".into()));
        assert_eq!(m.signature.params[0].ty, TypeRef::array(TypeRef::Generic("T".into())));
    }

    #[test]
    fn nullable_and_arrays() {
        assert_eq!(parse_type("i32?").unwrap(), TypeRef::nullable(I32));
        assert_eq!(parse_type("string[][]").unwrap(), TypeRef::array(TypeRef::array(TypeRef::String)));
    }

    #[test]
    fn constructor_forms() {
        let ret = TypeRef::named("Demo.Point");
        assert_eq!(parse_constructor("(f64 x, f64 y)", ret.clone()).unwrap().params.len(), 2);
        assert_eq!(parse_constructor("new()", ret.clone()).unwrap().return_type, ret);
    }

    #[test]
    fn delegate_with_and_without_name() {
        let a = parse_delegate("i32 (i32, i32)").unwrap();
        let b = parse_delegate("i32 BinaryOp(i32 x, i32 y)").unwrap();
        assert_eq!(a.params.len(), 2);
        assert_eq!(a.params[0].name, "arg0");
        assert_eq!(b.params[1].name, "y");
    }

    #[test]
    fn field_decl() {
        let f = parse_field("static string Name").unwrap();
        assert!(f.is_static);
        assert_eq!(f.ty, TypeRef::String);
        assert_eq!(f.name, "Name");
    }

    #[test]
    fn malformed_declarations() {
        assert!(parse_method("i32 add(i32 a, i32 b").is_err());
        assert!(parse_method("i32 add(i32 a) extra").is_err());
        assert!(parse_method("i32 (i32 a)").is_err());
        assert!(parse_method("i32 add(i32 a; i32 b)").is_err());
    }
}
