//! Recursive-descent parser producing the Cabs surface AST.
//!
//! Three tokens of lookahead (`cur`, `peek`, `peek2`) disambiguate
//! `struct Name { ... }` (a definition) from `struct Name ident` (a
//! declaration). The classic typedef/identifier ambiguity is resolved with a
//! translation-unit-wide typedef table: an identifier in a type position is a
//! type exactly when it is in the table. The table is insertion-ordered and
//! seeded with `__builtin_va_list`.
//!
//! Error recovery is policy, not exception: on failure inside a block the
//! parser syncs to the next `;`, `{` or `}`; at top level it skips forward to
//! the next token that could start a definition. All diagnostics are
//! recorded; the parse fails if any were.

mod expr;
mod stmt;

use indexmap::IndexSet;
use tracing::debug;

use crate::cabs::{
    CompositeDef, Decl, Definition, EnumItem, Expr, Field, InlineComposite, Param, Program,
    StorageClass,
};
use crate::diag::{DiagKind, Diagnostics, SyntaxError};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Marker for an abandoned parse attempt; the diagnostic has already been
/// recorded by the time this is returned.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Abort;

pub(crate) type PResult<T> = Result<T, Abort>;

/// A parsed declarator: the completed type string, the declared name, and any
/// array dimensions (empty expression = unsized).
pub(crate) struct Declarator {
    pub type_spec: String,
    pub name: String,
    pub array_dims: Vec<Option<Expr>>,
}

pub struct Parser {
    lx: Lexer,
    cur: Token,
    peek: Token,
    peek2: Token,
    file: String,
    typedefs: IndexSet<String>,
    diags: Diagnostics,
}

/// Parse a full translation unit. Returns the program only if no diagnostics
/// were recorded; otherwise all diagnostics, in order.
pub fn parse_translation_unit(src: &str, file: &str) -> Result<Program, SyntaxError> {
    let mut parser = Parser::new(src, file);
    let program = parser.parse_program();
    if parser.diags.is_empty() {
        Ok(program)
    } else {
        let diagnostics = parser.diags.into_entries();
        Err(SyntaxError {
            file: file.to_string(),
            count: diagnostics.len(),
            diagnostics,
        })
    }
}

impl Parser {
    pub fn new(src: &str, file: &str) -> Self {
        let mut lx = Lexer::new(src, file);
        let cur = lx.next_token();
        let peek = lx.next_token();
        let peek2 = lx.next_token();
        let mut typedefs = IndexSet::new();
        typedefs.insert("__builtin_va_list".to_string());
        Parser {
            file: lx.filename().to_string(),
            lx,
            cur,
            peek,
            peek2,
            typedefs,
            diags: Diagnostics::new(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    /// Parse until end of input, recovering at definition boundaries.
    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        while self.cur.kind != TokenKind::Eof {
            match self.parse_definition() {
                Ok(defs) => program.defs.extend(defs),
                Err(Abort) => self.skip_to_next_definition(),
            }
        }
        debug!(definitions = program.defs.len(), "parsed translation unit");
        program
    }

    // -----------------------------------------------------------------------
    // Token plumbing
    // -----------------------------------------------------------------------

    pub(crate) fn bump(&mut self) {
        let next = self.lx.next_token();
        self.cur = std::mem::replace(&mut self.peek, std::mem::replace(&mut self.peek2, next));
        if self.file != self.lx.filename() {
            self.file = self.lx.filename().to_string();
        }
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.cur.kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.cur.kind == kind {
            let tok = self.cur.clone();
            self.bump();
            Ok(tok)
        } else {
            self.error_here(format!("expected '{}', found '{}'", kind, self.cur.kind));
            Err(Abort)
        }
    }

    pub(crate) fn expect_ident(&mut self) -> PResult<String> {
        if self.cur.kind == TokenKind::Ident {
            let name = self.cur.literal.clone();
            self.bump();
            Ok(name)
        } else {
            self.error_here(format!("expected identifier, found '{}'", self.cur.kind));
            Err(Abort)
        }
    }

    pub(crate) fn cur_kind(&self) -> TokenKind {
        self.cur.kind
    }

    pub(crate) fn cur_token(&self) -> &Token {
        &self.cur
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek.kind
    }

    pub(crate) fn error_here(&mut self, message: impl Into<String>) {
        let pos = self.cur.pos;
        self.diags.record(&self.file, pos, DiagKind::Parse, message);
    }

    // -----------------------------------------------------------------------
    // Recovery points
    // -----------------------------------------------------------------------

    /// Skip forward to just past the next `;`, or stop at a brace.
    pub(crate) fn sync_to_stmt_end(&mut self) {
        loop {
            match self.cur.kind {
                TokenKind::Semicolon => {
                    self.bump();
                    break;
                }
                TokenKind::LBrace | TokenKind::RBrace | TokenKind::Eof => break,
                _ => self.bump(),
            }
        }
    }

    /// Skip forward to the next token that could start a top-level definition.
    pub(crate) fn skip_to_next_definition(&mut self) {
        loop {
            if self.cur.kind == TokenKind::Eof {
                break;
            }
            self.bump();
            if self.cur.kind.starts_declaration() || self.is_typedef_name(&self.cur) {
                break;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Type detection
    // -----------------------------------------------------------------------

    pub(crate) fn is_typedef_name(&self, tok: &Token) -> bool {
        tok.kind == TokenKind::Ident && self.typedefs.contains(&tok.literal)
    }

    /// Could `tok` begin a type name (in a cast, sizeof, or declaration)?
    pub(crate) fn starts_type_name(&self, tok: &Token) -> bool {
        tok.kind.is_type_specifier()
            || matches!(
                tok.kind,
                TokenKind::Struct
                    | TokenKind::Union
                    | TokenKind::Enum
                    | TokenKind::Const
                    | TokenKind::Volatile
                    | TokenKind::BuiltinVaList
            )
            || self.is_typedef_name(tok)
    }

    /// Does the current token begin a local declaration?
    pub(crate) fn at_declaration_start(&self) -> bool {
        self.cur.kind.starts_declaration() || self.is_typedef_name(&self.cur)
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    fn parse_definition(&mut self) -> PResult<Vec<Definition>> {
        // Stray top-level semicolons are tolerated.
        if self.eat(TokenKind::Semicolon) {
            return Ok(Vec::new());
        }
        let mut storage = None;
        loop {
            match self.cur.kind {
                TokenKind::Static => {
                    storage = Some(StorageClass::Static);
                    self.bump();
                }
                TokenKind::Extern => {
                    storage = Some(StorageClass::Extern);
                    self.bump();
                }
                TokenKind::Inline => self.bump(),
                TokenKind::Attribute | TokenKind::Asm => self.skip_attr_group()?,
                _ => break,
            }
        }

        match self.cur.kind {
            TokenKind::Typedef => self.parse_typedef().map(|d| vec![d]),
            TokenKind::Struct | TokenKind::Union
                if self.peek.kind == TokenKind::Ident && self.peek2.kind == TokenKind::LBrace =>
            {
                self.parse_composite_definition(storage)
            }
            TokenKind::Struct | TokenKind::Union if self.peek.kind == TokenKind::LBrace => {
                self.error_here("anonymous struct/union is only supported inside a typedef");
                Err(Abort)
            }
            TokenKind::Enum
                if self.peek.kind == TokenKind::LBrace
                    || (self.peek.kind == TokenKind::Ident
                        && self.peek2.kind == TokenKind::LBrace) =>
            {
                self.parse_enum_definition().map(|d| vec![d])
            }
            _ => {
                let base = self.parse_type_spec()?;
                self.parse_init_declarators(storage, base)
            }
        }
    }

    /// `struct Name { ... }` followed by `;` or by declarators of that type.
    fn parse_composite_definition(
        &mut self,
        storage: Option<StorageClass>,
    ) -> PResult<Vec<Definition>> {
        let is_union = self.cur.kind == TokenKind::Union;
        self.bump();
        let name = self.expect_ident()?;
        let fields = self.parse_composite_body()?;
        let def = CompositeDef {
            name: name.clone(),
            fields,
        };
        let mut defs = vec![if is_union {
            Definition::UnionDef(def)
        } else {
            Definition::StructDef(def)
        }];
        if self.eat(TokenKind::Semicolon) {
            return Ok(defs);
        }
        let kw = if is_union { "union" } else { "struct" };
        defs.extend(self.parse_init_declarators(storage, format!("{} {}", kw, name))?);
        Ok(defs)
    }

    /// `{ field-declarations }` of a struct or union.
    fn parse_composite_body(&mut self) -> PResult<Vec<Field>> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while self.cur.kind != TokenKind::RBrace && self.cur.kind != TokenKind::Eof {
            let base = self.parse_type_spec()?;
            loop {
                let d = self.parse_declarator(&base)?;
                fields.push(Field {
                    type_spec: d.type_spec,
                    name: d.name,
                    array_dims: d.array_dims,
                });
                if self.eat(TokenKind::Comma) {
                    continue;
                }
                self.expect(TokenKind::Semicolon)?;
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(fields)
    }

    fn parse_enum_definition(&mut self) -> PResult<Definition> {
        self.expect(TokenKind::Enum)?;
        let name = if self.cur.kind == TokenKind::Ident {
            let n = self.cur.literal.clone();
            self.bump();
            n
        } else {
            String::new()
        };
        self.expect(TokenKind::LBrace)?;
        let mut items = Vec::new();
        while self.cur.kind != TokenKind::RBrace && self.cur.kind != TokenKind::Eof {
            let item_name = self.expect_ident()?;
            let value = if self.eat(TokenKind::Assign) {
                Some(self.parse_constant_expr()?)
            } else {
                None
            };
            items.push(EnumItem {
                name: item_name,
                value,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Definition::EnumDef { name, items })
    }

    fn parse_typedef(&mut self) -> PResult<Definition> {
        self.expect(TokenKind::Typedef)?;

        // Inline aggregate: `typedef struct [Tag] { ... } Alias;`
        if matches!(self.cur.kind, TokenKind::Struct | TokenKind::Union)
            && (self.peek.kind == TokenKind::LBrace
                || (self.peek.kind == TokenKind::Ident && self.peek2.kind == TokenKind::LBrace))
        {
            let is_union = self.cur.kind == TokenKind::Union;
            self.bump();
            let tag = if self.cur.kind == TokenKind::Ident {
                let t = self.cur.literal.clone();
                self.bump();
                Some(t)
            } else {
                None
            };
            let fields = self.parse_composite_body()?;
            let alias = self.expect_ident()?;
            self.expect(TokenKind::Semicolon)?;
            // An anonymous aggregate takes the alias as its tag.
            let tag = tag.unwrap_or_else(|| alias.clone());
            let kw = if is_union { "union" } else { "struct" };
            self.typedefs.insert(alias.clone());
            return Ok(Definition::TypedefDef {
                type_spec: format!("{} {}", kw, tag),
                name: alias,
                inline_composite: Some(InlineComposite {
                    is_union,
                    def: CompositeDef { name: tag, fields },
                }),
            });
        }

        let base = self.parse_type_spec()?;
        let d = self.parse_declarator(&base)?;
        self.expect(TokenKind::Semicolon)?;
        let mut spec = d.type_spec;
        for dim in &d.array_dims {
            match dim {
                Some(e) => spec.push_str(&format!("[{}]", crate::printer::expr_to_string(e))),
                None => spec.push_str("[]"),
            }
        }
        self.typedefs.insert(d.name.clone());
        Ok(Definition::TypedefDef {
            type_spec: spec,
            name: d.name,
            inline_composite: None,
        })
    }

    /// Parse declarators after a base type, producing either one function
    /// definition or a run of variable definitions.
    fn parse_init_declarators(
        &mut self,
        storage: Option<StorageClass>,
        base: String,
    ) -> PResult<Vec<Definition>> {
        // `struct P;` and friends: a type mention with no declarator.
        if self.eat(TokenKind::Semicolon) {
            return Ok(Vec::new());
        }
        let first = self.parse_declarator(&base)?;

        if self.cur.kind == TokenKind::LParen && first.array_dims.is_empty() {
            // Function definition or prototype.
            let (params, variadic) = self.parse_param_list()?;
            self.skip_decl_extensions()?;
            let body = if self.cur.kind == TokenKind::LBrace {
                Some(self.parse_block()?)
            } else {
                self.expect(TokenKind::Semicolon)?;
                None
            };
            return Ok(vec![Definition::FunDef {
                return_spec: first.type_spec,
                name: first.name,
                params,
                variadic,
                body,
            }]);
        }

        let mut defs = Vec::new();
        let mut d = first;
        loop {
            let init = if self.eat(TokenKind::Assign) {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            defs.push(Definition::VarDef {
                storage,
                type_spec: d.type_spec,
                name: d.name,
                array_dims: d.array_dims,
                init,
            });
            if self.eat(TokenKind::Comma) {
                d = self.parse_declarator(&base)?;
                continue;
            }
            self.expect(TokenKind::Semicolon)?;
            break;
        }
        Ok(defs)
    }

    // -----------------------------------------------------------------------
    // Declarators and type specifiers
    // -----------------------------------------------------------------------

    /// Parse one declarator against a base type: pointer stars, the declared
    /// name (or the `(*name)(params)` function-pointer form), array dims.
    pub(crate) fn parse_declarator(&mut self, base: &str) -> PResult<Declarator> {
        self.skip_decl_extensions()?;
        let mut spec = base.to_string();
        while self.eat(TokenKind::Star) {
            spec.push('*');
            self.skip_qualifiers();
        }

        if self.cur.kind == TokenKind::LParen && self.peek.kind == TokenKind::Star {
            // Function pointer: ( * name ) ( params )
            self.bump();
            self.expect(TokenKind::Star)?;
            let name = self.expect_ident()?;
            self.expect(TokenKind::RParen)?;
            let params = self.parse_fnptr_param_types()?;
            return Ok(Declarator {
                type_spec: format!("{} (*)({})", spec, params.join(", ")),
                name,
                array_dims: Vec::new(),
            });
        }

        let name = self.expect_ident()?;
        self.skip_decl_extensions()?;
        let mut array_dims = Vec::new();
        while self.eat(TokenKind::LBracket) {
            if self.eat(TokenKind::RBracket) {
                array_dims.push(None);
            } else {
                let e = self.parse_assignment_expr()?;
                self.expect(TokenKind::RBracket)?;
                array_dims.push(Some(e));
            }
        }
        Ok(Declarator {
            type_spec: spec,
            name,
            array_dims,
        })
    }

    /// Parse a type name as used in casts and `sizeof(...)`: base specifier,
    /// pointer stars, and optionally the abstract function-pointer form.
    pub(crate) fn parse_type_name(&mut self) -> PResult<String> {
        let mut spec = self.parse_type_spec()?;
        while self.eat(TokenKind::Star) {
            spec.push('*');
            self.skip_qualifiers();
        }
        if self.cur.kind == TokenKind::LParen
            && self.peek.kind == TokenKind::Star
            && self.peek2.kind == TokenKind::RParen
        {
            self.bump();
            self.bump();
            self.expect(TokenKind::RParen)?;
            let params = self.parse_fnptr_param_types()?;
            spec = format!("{} (*)({})", spec, params.join(", "));
        }
        Ok(spec)
    }

    /// Collect type-specifier keywords into a multiset and canonicalize, or
    /// return the named form for struct/union/enum/typedef references.
    pub(crate) fn parse_type_spec(&mut self) -> PResult<String> {
        let mut words: Vec<&'static str> = Vec::new();
        loop {
            match self.cur.kind {
                TokenKind::Const | TokenKind::Volatile | TokenKind::Restrict | TokenKind::Inline => {
                    self.bump()
                }
                TokenKind::Attribute | TokenKind::Asm => self.skip_attr_group()?,
                TokenKind::Struct | TokenKind::Union => {
                    if !words.is_empty() {
                        self.error_here("unexpected 'struct' after type specifiers");
                        return Err(Abort);
                    }
                    let kw = if self.cur.kind == TokenKind::Union {
                        "union"
                    } else {
                        "struct"
                    };
                    self.bump();
                    let name = self.expect_ident()?;
                    return Ok(format!("{} {}", kw, name));
                }
                TokenKind::Enum => {
                    if !words.is_empty() {
                        self.error_here("unexpected 'enum' after type specifiers");
                        return Err(Abort);
                    }
                    self.bump();
                    let name = self.expect_ident()?;
                    return Ok(format!("enum {}", name));
                }
                TokenKind::BuiltinVaList => {
                    self.bump();
                    return Ok("__builtin_va_list".to_string());
                }
                TokenKind::Ident if words.is_empty() && self.typedefs.contains(&self.cur.literal) => {
                    let name = self.cur.literal.clone();
                    self.bump();
                    return Ok(name);
                }
                k if k.is_type_specifier() => {
                    words.push(specifier_word(k));
                    self.bump();
                }
                _ => break,
            }
        }
        if words.is_empty() {
            self.error_here(format!(
                "expected type specifier, found '{}'",
                self.cur.kind
            ));
            return Err(Abort);
        }
        match normalize_specifiers(&words) {
            Ok(spec) => Ok(spec),
            Err(msg) => {
                self.error_here(msg);
                Err(Abort)
            }
        }
    }

    fn skip_qualifiers(&mut self) {
        while matches!(
            self.cur.kind,
            TokenKind::Const | TokenKind::Volatile | TokenKind::Restrict
        ) {
            self.bump();
        }
    }

    /// Consume any run of `__attribute__((...))`, `__asm(...)` and `inline`.
    pub(crate) fn skip_decl_extensions(&mut self) -> PResult<()> {
        loop {
            match self.cur.kind {
                TokenKind::Attribute | TokenKind::Asm => self.skip_attr_group()?,
                TokenKind::Inline => self.bump(),
                _ => return Ok(()),
            }
        }
    }

    /// Skip `__attribute__` / `__asm` together with its paren-balanced body.
    fn skip_attr_group(&mut self) -> PResult<()> {
        self.bump(); // the keyword
        self.expect(TokenKind::LParen)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.cur.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                TokenKind::Eof => {
                    self.error_here("unterminated attribute");
                    return Err(Abort);
                }
                _ => {}
            }
            self.bump();
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Parameter lists
    // -----------------------------------------------------------------------

    /// `( params )` for a function declarator. `(void)` and `()` are empty.
    fn parse_param_list(&mut self) -> PResult<(Vec<Param>, bool)> {
        self.expect(TokenKind::LParen)?;
        if self.eat(TokenKind::RParen) {
            return Ok((Vec::new(), false));
        }
        if self.cur.kind == TokenKind::Void && self.peek.kind == TokenKind::RParen {
            self.bump();
            self.bump();
            return Ok((Vec::new(), false));
        }
        let mut params = Vec::new();
        let mut variadic = false;
        loop {
            if self.cur.kind == TokenKind::Ellipsis {
                self.bump();
                variadic = true;
                self.expect(TokenKind::RParen)?;
                break;
            }
            params.push(self.parse_param()?);
            if self.eat(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen)?;
            break;
        }
        Ok((params, variadic))
    }

    fn parse_param(&mut self) -> PResult<Param> {
        let mut spec = self.parse_type_spec()?;
        while self.eat(TokenKind::Star) {
            spec.push('*');
            self.skip_qualifiers();
        }

        if self.cur.kind == TokenKind::LParen && self.peek.kind == TokenKind::Star {
            // Function-pointer parameter, named or abstract.
            self.bump();
            self.expect(TokenKind::Star)?;
            let name = if self.cur.kind == TokenKind::Ident {
                let n = self.cur.literal.clone();
                self.bump();
                n
            } else {
                String::new()
            };
            self.expect(TokenKind::RParen)?;
            let inner = self.parse_fnptr_param_types()?;
            return Ok(Param {
                type_spec: format!("{} (*)({})", spec, inner.join(", ")),
                name,
            });
        }

        let name = if self.cur.kind == TokenKind::Ident {
            let n = self.cur.literal.clone();
            self.bump();
            n
        } else {
            String::new()
        };
        // Array parameters decay to pointers.
        while self.eat(TokenKind::LBracket) {
            if !self.eat(TokenKind::RBracket) {
                let _ = self.parse_assignment_expr()?;
                self.expect(TokenKind::RBracket)?;
            }
            spec.push('*');
        }
        Ok(Param {
            type_spec: spec,
            name,
        })
    }

    /// Parameter *types* of a function-pointer declarator: `( t1, t2, ... )`.
    fn parse_fnptr_param_types(&mut self) -> PResult<Vec<String>> {
        self.expect(TokenKind::LParen)?;
        let mut types = Vec::new();
        if self.eat(TokenKind::RParen) {
            return Ok(types);
        }
        if self.cur.kind == TokenKind::Void && self.peek.kind == TokenKind::RParen {
            self.bump();
            self.bump();
            return Ok(types);
        }
        loop {
            let mut spec = self.parse_type_spec()?;
            while self.eat(TokenKind::Star) {
                spec.push('*');
                self.skip_qualifiers();
            }
            // A parameter name, if present, is irrelevant to the type.
            if self.cur.kind == TokenKind::Ident {
                self.bump();
            }
            types.push(spec);
            if self.eat(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen)?;
            break;
        }
        Ok(types)
    }

    // -----------------------------------------------------------------------
    // Local declarations
    // -----------------------------------------------------------------------

    /// A run of declarators sharing one base type, up to `;`.
    pub(crate) fn parse_local_decls(&mut self) -> PResult<Vec<Decl>> {
        let base = self.parse_type_spec()?;
        let mut decls = Vec::new();
        loop {
            let d = self.parse_declarator(&base)?;
            let init = if self.eat(TokenKind::Assign) {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            decls.push(Decl {
                type_spec: d.type_spec,
                name: d.name,
                array_dims: d.array_dims,
                init,
            });
            if self.eat(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::Semicolon)?;
            break;
        }
        Ok(decls)
    }
}

fn specifier_word(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Void => "void",
        TokenKind::Char => "char",
        TokenKind::Short => "short",
        TokenKind::Int => "int",
        TokenKind::Long => "long",
        TokenKind::Signed => "signed",
        TokenKind::Unsigned => "unsigned",
        TokenKind::Float => "float",
        TokenKind::Double => "double",
        _ => unreachable!("not a type specifier keyword"),
    }
}

fn is_specifier_word(w: &str) -> bool {
    matches!(
        w,
        "void" | "char" | "short" | "int" | "long" | "signed" | "unsigned" | "float" | "double"
    )
}

/// Canonicalize a multiset of plain type-specifier keywords.
///
/// The order of the input words is irrelevant: `long unsigned int long` and
/// `unsigned long long int` both normalize to `unsigned long long`.
pub fn normalize_specifiers(words: &[&str]) -> Result<String, String> {
    let mut voids = 0;
    let mut chars = 0;
    let mut shorts = 0;
    let mut ints = 0;
    let mut longs = 0;
    let mut signeds = 0;
    let mut unsigneds = 0;
    let mut floats = 0;
    let mut doubles = 0;
    for w in words {
        match *w {
            "void" => voids += 1,
            "char" => chars += 1,
            "short" => shorts += 1,
            "int" => ints += 1,
            "long" => longs += 1,
            "signed" => signeds += 1,
            "unsigned" => unsigneds += 1,
            "float" => floats += 1,
            "double" => doubles += 1,
            other => return Err(format!("unknown type specifier '{}'", other)),
        }
    }
    if signeds > 0 && unsigneds > 0 {
        return Err("both 'signed' and 'unsigned' in declaration specifiers".to_string());
    }
    if voids > 0 {
        if words.len() != voids {
            return Err("'void' combined with other type specifiers".to_string());
        }
        return Ok("void".to_string());
    }
    if floats > 0 {
        if chars + shorts + ints + longs + doubles > 0 {
            return Err("invalid combination with 'float'".to_string());
        }
        return Ok("float".to_string());
    }
    if doubles > 0 {
        if chars + shorts + ints > 0 {
            return Err("invalid combination with 'double'".to_string());
        }
        return Ok(if longs > 0 { "long double" } else { "double" }.to_string());
    }
    if chars > 0 {
        if shorts + ints + longs > 0 {
            return Err("invalid combination with 'char'".to_string());
        }
        return Ok(if unsigneds > 0 {
            "unsigned char"
        } else if signeds > 0 {
            "signed char"
        } else {
            "char"
        }
        .to_string());
    }
    if shorts > 0 {
        if longs > 0 {
            return Err("both 'short' and 'long' in declaration specifiers".to_string());
        }
        return Ok(if unsigneds > 0 { "unsigned short" } else { "short" }.to_string());
    }
    match longs {
        0 => Ok(if unsigneds > 0 { "unsigned" } else { "int" }.to_string()),
        1 => Ok(if unsigneds > 0 { "unsigned long" } else { "long" }.to_string()),
        2 => Ok(if unsigneds > 0 {
            "unsigned long long"
        } else {
            "long long"
        }
        .to_string()),
        _ => Err("too many 'long' specifiers".to_string()),
    }
}

/// Re-normalize a type-spec string. Canonical strings are fixed points, which
/// is the property the parser relies on when splicing specs back together.
pub fn normalize_type_spec(spec: &str) -> String {
    let trimmed = spec.trim();
    let base = trimmed.trim_end_matches('*');
    let stars = &trimmed[base.len()..];
    let words: Vec<&str> = base.split_whitespace().collect();
    if !words.is_empty() && words.iter().all(|w| is_specifier_word(w)) {
        match normalize_specifiers(&words) {
            Ok(n) => format!("{}{}", n, stars),
            Err(_) => trimmed.to_string(),
        }
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cabs::*;

    fn parse_ok(src: &str) -> Program {
        match parse_translation_unit(src, "test.c") {
            Ok(p) => p,
            Err(diags) => panic!("unexpected diagnostics: {:?}", diags),
        }
    }

    fn parse_err(src: &str) -> Vec<crate::diag::Diagnostic> {
        parse_translation_unit(src, "test.c")
            .expect_err("expected diagnostics")
            .diagnostics
    }

    #[test]
    fn empty_function_body() {
        let p = parse_ok("int main() { }");
        assert_eq!(p.defs.len(), 1);
        match &p.defs[0] {
            Definition::FunDef {
                name, body, params, ..
            } => {
                assert_eq!(name, "main");
                assert_eq!(params.len(), 0);
                assert_eq!(body.as_ref().unwrap().len(), 0);
            }
            other => panic!("expected FunDef, got {:?}", other),
        }
    }

    #[test]
    fn pointer_binds_to_declarator() {
        let p = parse_ok("int main() { int *p, q; return 0; }");
        let body = match &p.defs[0] {
            Definition::FunDef { body, .. } => body.as_ref().unwrap(),
            _ => unreachable!(),
        };
        match &body[0] {
            Stmt::Decl(decls) => {
                assert_eq!(decls.len(), 2);
                assert_eq!(decls[0].type_spec, "int*");
                assert_eq!(decls[0].name, "p");
                assert_eq!(decls[1].type_spec, "int");
                assert_eq!(decls[1].name, "q");
            }
            other => panic!("expected Decl, got {:?}", other),
        }
    }

    #[test]
    fn function_pointer_declarator() {
        let p = parse_ok("int main() { int (*fp)(int, int); return 0; }");
        let body = match &p.defs[0] {
            Definition::FunDef { body, .. } => body.as_ref().unwrap(),
            _ => unreachable!(),
        };
        match &body[0] {
            Stmt::Decl(decls) => {
                assert_eq!(decls.len(), 1);
                assert_eq!(decls[0].type_spec, "int (*)(int, int)");
                assert_eq!(decls[0].name, "fp");
            }
            other => panic!("expected Decl, got {:?}", other),
        }
    }

    #[test]
    fn typedef_then_cast() {
        // `foo x;` declares, and `(foo)3` is a cast, not a call.
        let p = parse_ok("typedef int foo; int main() { foo x; x = (foo)3; return x; }");
        let body = match &p.defs[1] {
            Definition::FunDef { body, .. } => body.as_ref().unwrap(),
            _ => unreachable!(),
        };
        match &body[0] {
            Stmt::Decl(decls) => assert_eq!(decls[0].type_spec, "foo"),
            other => panic!("expected Decl, got {:?}", other),
        }
        match &body[1] {
            Stmt::Computation(Expr::Binary { op, rhs, .. }) => {
                assert_eq!(*op, BinaryOp::Assign);
                assert!(matches!(**rhs, Expr::Cast { .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn specifier_multiset_in_any_order() {
        let p = parse_ok("long unsigned int long x;");
        match &p.defs[0] {
            Definition::VarDef { type_spec, .. } => {
                assert_eq!(type_spec, "unsigned long long");
            }
            other => panic!("expected VarDef, got {:?}", other),
        }
    }

    #[test]
    fn struct_definition_vs_declaration() {
        let p = parse_ok("struct P { int x; int y; }; int f(struct P *p) { return 0; }");
        assert!(matches!(p.defs[0], Definition::StructDef(_)));
        match &p.defs[1] {
            Definition::FunDef { params, .. } => {
                assert_eq!(params[0].type_spec, "struct P*");
            }
            other => panic!("expected FunDef, got {:?}", other),
        }
    }

    #[test]
    fn struct_definition_with_declarator() {
        let p = parse_ok("struct P { int x; } g;");
        assert!(matches!(p.defs[0], Definition::StructDef(_)));
        match &p.defs[1] {
            Definition::VarDef {
                type_spec, name, ..
            } => {
                assert_eq!(type_spec, "struct P");
                assert_eq!(name, "g");
            }
            other => panic!("expected VarDef, got {:?}", other),
        }
    }

    #[test]
    fn typedef_inline_struct() {
        let p = parse_ok("typedef struct { int a; } pair;");
        match &p.defs[0] {
            Definition::TypedefDef {
                type_spec,
                name,
                inline_composite,
            } => {
                assert_eq!(type_spec, "struct pair");
                assert_eq!(name, "pair");
                assert!(inline_composite.is_some());
            }
            other => panic!("expected TypedefDef, got {:?}", other),
        }
    }

    #[test]
    fn enum_definition() {
        let p = parse_ok("enum Color { RED, GREEN = 5, BLUE };");
        match &p.defs[0] {
            Definition::EnumDef { name, items } => {
                assert_eq!(name, "Color");
                assert_eq!(items.len(), 3);
                assert_eq!(items[1].name, "GREEN");
                assert!(items[1].value.is_some());
            }
            other => panic!("expected EnumDef, got {:?}", other),
        }
    }

    #[test]
    fn attributes_are_stripped() {
        let p = parse_ok("__attribute__((noinline)) int f(void) { return 1; }");
        assert!(matches!(p.defs[0], Definition::FunDef { .. }));
    }

    #[test]
    fn variadic_prototype() {
        let p = parse_ok("int printf(char *fmt, ...);");
        match &p.defs[0] {
            Definition::FunDef {
                variadic, body, ..
            } => {
                assert!(*variadic);
                assert!(body.is_none());
            }
            other => panic!("expected FunDef, got {:?}", other),
        }
    }

    #[test]
    fn parse_error_recovers_and_reports() {
        let diags = parse_err("int f() { int x = ; return 0; } int g() { return 1; }");
        assert!(!diags.is_empty());
        assert!(diags[0].short().starts_with("line 1, col "));
    }

    #[test]
    fn normalize_is_idempotent_on_table() {
        for spec in [
            "char",
            "signed char",
            "unsigned char",
            "short",
            "unsigned short",
            "int",
            "unsigned",
            "long",
            "unsigned long",
            "long long",
            "unsigned long long",
            "float",
            "double",
            "long double",
            "void",
        ] {
            assert_eq!(normalize_type_spec(spec), spec);
            assert_eq!(
                normalize_type_spec(&normalize_type_spec(spec)),
                normalize_type_spec(spec)
            );
        }
    }

    #[test]
    fn normalize_keeps_named_types() {
        assert_eq!(normalize_type_spec("struct P*"), "struct P*");
        assert_eq!(normalize_type_spec("size_t"), "size_t");
        assert_eq!(normalize_type_spec("long int unsigned"), "unsigned long");
    }
}
