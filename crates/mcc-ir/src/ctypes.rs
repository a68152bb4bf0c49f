//! The canonical C type system shared by Clight and every IR below it.
//!
//! Nominal struct/union references are resolved lazily through a
//! [`CompositeEnv`] (a name-to-definition map) so that self-referential
//! types like `struct list { struct list *next; }` need no cyclic ownership.
//!
//! Layout rules: fields in declaration order, each aligned to its natural
//! alignment (char=1, short=2, int=4, long/pointer=8); struct alignment is
//! the max field alignment; trailing padding rounds the size up to a multiple
//! of that alignment. Unions overlap all fields at offset 0.

use std::fmt;

use indexmap::IndexMap;

use crate::error::ElabError;

/// Integer signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// Sub-`long` integer sizes. `IBool` is the `_Bool`-like one-byte carrier
/// used for normalized truth values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSize {
    I8,
    I16,
    I32,
    IBool,
}

/// Canonical C types.
#[derive(Debug, Clone, PartialEq)]
pub enum CType {
    Void,
    Int { size: IntSize, sign: Signedness },
    Long { sign: Signedness },
    Float32,
    Float64,
    Pointer(Box<CType>),
    Array { elem: Box<CType>, len: Option<u64> },
    Function { ret: Box<CType>, params: Vec<CType>, variadic: bool },
    Struct(String),
    Union(String),
}

impl CType {
    pub fn int() -> CType {
        CType::Int {
            size: IntSize::I32,
            sign: Signedness::Signed,
        }
    }

    pub fn char() -> CType {
        CType::Int {
            size: IntSize::I8,
            sign: Signedness::Signed,
        }
    }

    pub fn unsigned_long() -> CType {
        CType::Long {
            sign: Signedness::Unsigned,
        }
    }

    pub fn pointer(to: CType) -> CType {
        CType::Pointer(Box::new(to))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, CType::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, CType::Int { .. } | CType::Long { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, CType::Float32 | CType::Float64)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    /// Pointer-like for arithmetic purposes: pointers and arrays.
    pub fn is_pointerish(&self) -> bool {
        matches!(self, CType::Pointer(_) | CType::Array { .. })
    }

    /// Scalar values fit a register and are accessed by value.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            CType::Int { .. }
                | CType::Long { .. }
                | CType::Float32
                | CType::Float64
                | CType::Pointer(_)
        )
    }

    /// Aggregates are accessed by reference.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, CType::Array { .. } | CType::Struct(_) | CType::Union(_))
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            CType::Int {
                sign: Signedness::Unsigned,
                ..
            } | CType::Long {
                sign: Signedness::Unsigned
            }
        )
    }

    /// Is this a 64-bit-wide value class (long or pointer)?
    pub fn is_wide(&self) -> bool {
        matches!(
            self,
            CType::Long { .. } | CType::Pointer(_) | CType::Array { .. } | CType::Function { .. }
        )
    }

    /// The element type behind a pointer or array, if any.
    pub fn pointee(&self) -> Option<&CType> {
        match self {
            CType::Pointer(t) => Some(t),
            CType::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    pub fn sizeof(&self, env: &CompositeEnv) -> Result<u64, ElabError> {
        match self {
            CType::Void => Ok(1),
            CType::Int { size, .. } => Ok(match size {
                IntSize::I8 | IntSize::IBool => 1,
                IntSize::I16 => 2,
                IntSize::I32 => 4,
            }),
            CType::Long { .. } => Ok(8),
            CType::Float32 => Ok(4),
            CType::Float64 => Ok(8),
            CType::Pointer(_) | CType::Function { .. } => Ok(8),
            CType::Array { elem, len } => {
                let n = len.ok_or_else(|| ElabError::UnknownSize {
                    ty: self.to_string(),
                })?;
                Ok(elem.sizeof(env)? * n)
            }
            CType::Struct(name) | CType::Union(name) => Ok(env.layout(name)?.size),
        }
    }

    pub fn alignof(&self, env: &CompositeEnv) -> Result<u64, ElabError> {
        match self {
            CType::Void => Ok(1),
            CType::Int { size, .. } => Ok(match size {
                IntSize::I8 | IntSize::IBool => 1,
                IntSize::I16 => 2,
                IntSize::I32 => 4,
            }),
            CType::Long { .. } => Ok(8),
            CType::Float32 => Ok(4),
            CType::Float64 => Ok(8),
            CType::Pointer(_) | CType::Function { .. } => Ok(8),
            CType::Array { elem, .. } => elem.alignof(env),
            CType::Struct(name) | CType::Union(name) => Ok(env.layout(name)?.align),
        }
    }

    /// The memory chunk used to access a value of this type, or `None` for
    /// by-reference types.
    pub fn chunk(&self) -> Option<Chunk> {
        match self {
            CType::Int { size, sign } => Some(match (size, sign) {
                (IntSize::I8, Signedness::Signed) => Chunk::Int8s,
                (IntSize::I8, Signedness::Unsigned) => Chunk::Int8u,
                (IntSize::IBool, _) => Chunk::Int8u,
                (IntSize::I16, Signedness::Signed) => Chunk::Int16s,
                (IntSize::I16, Signedness::Unsigned) => Chunk::Int16u,
                (IntSize::I32, _) => Chunk::Int32,
            }),
            CType::Long { .. } | CType::Pointer(_) => Some(Chunk::Int64),
            CType::Float32 => Some(Chunk::F32),
            CType::Float64 => Some(Chunk::F64),
            _ => None,
        }
    }

    /// Parse a canonical type-spec string as produced by the parser's
    /// canonicalizer: a base form, optional `*`s, optional `[N]` dimensions,
    /// or the function-pointer form `ret (*)(params)`.
    pub fn parse(spec: &str, typedefs: &IndexMap<String, CType>) -> Result<CType, ElabError> {
        let spec = spec.trim();

        // Function pointer: `ret (*)(params)`.
        if let Some(idx) = spec.find("(*)") {
            let ret = CType::parse(&spec[..idx], typedefs)?;
            let args = spec[idx + 3..]
                .trim()
                .strip_prefix('(')
                .and_then(|s| s.strip_suffix(')'))
                .ok_or_else(|| ElabError::UnknownType {
                    name: spec.to_string(),
                })?;
            let mut params = Vec::new();
            for part in split_top_level(args) {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                params.push(CType::parse(part, typedefs)?);
            }
            return Ok(CType::pointer(CType::Function {
                ret: Box::new(ret),
                params,
                variadic: false,
            }));
        }

        // Array dimensions: `base[2][3]` is two arrays of three elements.
        if let Some(idx) = spec.find('[') {
            let base = CType::parse(&spec[..idx], typedefs)?;
            let mut dims = Vec::new();
            for dim in spec[idx..].trim_end_matches(']').split("][") {
                let dim = dim.trim_start_matches('[');
                if dim.is_empty() {
                    dims.push(None);
                } else {
                    let n = dim.parse::<u64>().map_err(|_| ElabError::UnknownType {
                        name: spec.to_string(),
                    })?;
                    dims.push(Some(n));
                }
            }
            let mut ty = base;
            for dim in dims.into_iter().rev() {
                ty = CType::Array {
                    elem: Box::new(ty),
                    len: dim,
                };
            }
            return Ok(ty);
        }

        // Pointer stars.
        if let Some(inner) = spec.strip_suffix('*') {
            return Ok(CType::pointer(CType::parse(inner, typedefs)?));
        }

        use IntSize::*;
        use Signedness::*;
        let ty = match spec {
            "void" => CType::Void,
            "char" | "signed char" => CType::Int { size: I8, sign: Signed },
            "unsigned char" => CType::Int { size: I8, sign: Unsigned },
            "short" => CType::Int { size: I16, sign: Signed },
            "unsigned short" => CType::Int { size: I16, sign: Unsigned },
            "int" => CType::Int { size: I32, sign: Signed },
            "unsigned" => CType::Int { size: I32, sign: Unsigned },
            "long" | "long long" => CType::Long { sign: Signed },
            "unsigned long" | "unsigned long long" => CType::Long { sign: Unsigned },
            "float" => CType::Float32,
            "double" | "long double" => CType::Float64,
            "__builtin_va_list" => CType::pointer(CType::Void),
            _ => {
                if let Some(name) = spec.strip_prefix("struct ") {
                    CType::Struct(name.trim().to_string())
                } else if let Some(name) = spec.strip_prefix("union ") {
                    CType::Union(name.trim().to_string())
                } else if spec.strip_prefix("enum ").is_some() {
                    CType::int()
                } else if let Some(resolved) = typedefs.get(spec) {
                    resolved.clone()
                } else {
                    return Err(ElabError::UnknownType {
                        name: spec.to_string(),
                    });
                }
            }
        };
        Ok(ty)
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Void => f.write_str("void"),
            CType::Int { size, sign } => {
                let name = match (size, sign) {
                    (IntSize::I8, Signedness::Signed) => "char",
                    (IntSize::I8, Signedness::Unsigned) => "unsigned char",
                    (IntSize::I16, Signedness::Signed) => "short",
                    (IntSize::I16, Signedness::Unsigned) => "unsigned short",
                    (IntSize::I32, Signedness::Signed) => "int",
                    (IntSize::I32, Signedness::Unsigned) => "unsigned",
                    (IntSize::IBool, _) => "_Bool",
                };
                f.write_str(name)
            }
            CType::Long {
                sign: Signedness::Signed,
            } => f.write_str("long"),
            CType::Long {
                sign: Signedness::Unsigned,
            } => f.write_str("unsigned long"),
            CType::Float32 => f.write_str("float"),
            CType::Float64 => f.write_str("double"),
            CType::Pointer(t) => write!(f, "{}*", t),
            CType::Array { elem, len } => match len {
                Some(n) => write!(f, "{}[{}]", elem, n),
                None => write!(f, "{}[]", elem),
            },
            CType::Function {
                ret,
                params,
                variadic,
            } => {
                write!(f, "{}(", ret)?;
                let mut first = true;
                for p in params {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{}", p)?;
                }
                if *variadic {
                    if !first {
                        f.write_str(", ")?;
                    }
                    f.write_str("...")?;
                }
                f.write_str(")")
            }
            CType::Struct(name) => write!(f, "struct {}", name),
            CType::Union(name) => write!(f, "union {}", name),
        }
    }
}

/// Split a parameter list on commas that are not nested inside parentheses
/// or brackets.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Memory access granularity, with extension behavior for sub-word loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    Int8s,
    Int8u,
    Int16s,
    Int16u,
    Int32,
    Int64,
    F32,
    F64,
}

impl Chunk {
    pub fn size(self) -> u64 {
        match self {
            Chunk::Int8s | Chunk::Int8u => 1,
            Chunk::Int16s | Chunk::Int16u => 2,
            Chunk::Int32 | Chunk::F32 => 4,
            Chunk::Int64 | Chunk::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Chunk::F32 | Chunk::F64)
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Chunk::Int8s => "int8s",
            Chunk::Int8u => "int8u",
            Chunk::Int16s => "int16s",
            Chunk::Int16u => "int16u",
            Chunk::Int32 => "int32",
            Chunk::Int64 => "int64",
            Chunk::F32 => "float32",
            Chunk::F64 => "float64",
        };
        f.write_str(s)
    }
}

/// Struct or union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    Struct,
    Union,
}

/// A struct or union definition: named fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub kind: CompositeKind,
    pub fields: Vec<(String, CType)>,
}

/// Computed layout of a composite.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
    /// Field offsets, in declaration order.
    pub offsets: Vec<(String, u64)>,
}

/// Name-to-definition map for structs and unions, insertion-ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositeEnv {
    entries: IndexMap<String, Composite>,
}

impl CompositeEnv {
    pub fn new() -> Self {
        CompositeEnv::default()
    }

    pub fn define(&mut self, name: &str, composite: Composite) {
        self.entries.insert(name.to_string(), composite);
    }

    pub fn get(&self, name: &str) -> Result<&Composite, ElabError> {
        self.entries
            .get(name)
            .ok_or_else(|| ElabError::UnknownComposite {
                name: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Composite)> {
        self.entries.iter()
    }

    /// Compute size, alignment and field offsets.
    pub fn layout(&self, name: &str) -> Result<Layout, ElabError> {
        let composite = self.get(name)?;
        let mut align = 1u64;
        let mut offsets = Vec::with_capacity(composite.fields.len());
        let mut size = 0u64;
        match composite.kind {
            CompositeKind::Struct => {
                let mut offset = 0u64;
                for (fname, fty) in &composite.fields {
                    let falign = fty.alignof(self)?;
                    let fsize = fty.sizeof(self)?;
                    offset = round_up(offset, falign);
                    offsets.push((fname.clone(), offset));
                    offset += fsize;
                    align = align.max(falign);
                }
                size = round_up(offset, align);
            }
            CompositeKind::Union => {
                for (fname, fty) in &composite.fields {
                    let falign = fty.alignof(self)?;
                    let fsize = fty.sizeof(self)?;
                    offsets.push((fname.clone(), 0));
                    size = size.max(fsize);
                    align = align.max(falign);
                }
                size = round_up(size, align);
            }
        }
        Ok(Layout {
            size,
            align,
            offsets,
        })
    }

    /// Offset and type of a field within a named composite.
    pub fn field(&self, name: &str, field: &str) -> Result<(u64, CType), ElabError> {
        let layout = self.layout(name)?;
        let composite = self.get(name)?;
        for ((fname, fty), (_, offset)) in composite.fields.iter().zip(layout.offsets.iter()) {
            if fname == field {
                return Ok((*offset, fty.clone()));
            }
        }
        Err(ElabError::UnknownField {
            composite: name.to_string(),
            field: field.to_string(),
        })
    }
}

pub fn round_up(value: u64, align: u64) -> u64 {
    debug_assert!(align > 0);
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(name: &str, kind: CompositeKind, fields: &[(&str, CType)]) -> CompositeEnv {
        let mut env = CompositeEnv::new();
        env.define(
            name,
            Composite {
                kind,
                fields: fields
                    .iter()
                    .map(|(n, t)| (n.to_string(), t.clone()))
                    .collect(),
            },
        );
        env
    }

    #[test]
    fn scalar_sizes() {
        let env = CompositeEnv::new();
        assert_eq!(CType::char().sizeof(&env).unwrap(), 1);
        assert_eq!(CType::int().sizeof(&env).unwrap(), 4);
        assert_eq!(CType::unsigned_long().sizeof(&env).unwrap(), 8);
        assert_eq!(CType::pointer(CType::int()).sizeof(&env).unwrap(), 8);
    }

    #[test]
    fn struct_layout_with_padding() {
        // struct { char c; int x; long l; } -> offsets 0/4/8, size 16, align 8
        let env = env_with(
            "s",
            CompositeKind::Struct,
            &[
                ("c", CType::char()),
                ("x", CType::int()),
                ("l", CType::Long { sign: Signedness::Signed }),
            ],
        );
        let layout = env.layout("s").unwrap();
        assert_eq!(layout.align, 8);
        assert_eq!(layout.size, 16);
        assert_eq!(
            layout.offsets,
            vec![("c".to_string(), 0), ("x".to_string(), 4), ("l".to_string(), 8)]
        );
    }

    #[test]
    fn point_struct_second_field_at_4() {
        let env = env_with(
            "P",
            CompositeKind::Struct,
            &[("x", CType::int()), ("y", CType::int())],
        );
        assert_eq!(env.field("P", "y").unwrap().0, 4);
        assert_eq!(env.layout("P").unwrap().size, 8);
    }

    #[test]
    fn union_layout() {
        let env = env_with(
            "u",
            CompositeKind::Union,
            &[
                ("i", CType::int()),
                ("l", CType::Long { sign: Signedness::Signed }),
            ],
        );
        let layout = env.layout("u").unwrap();
        assert_eq!(layout.size, 8);
        assert_eq!(layout.align, 8);
        assert_eq!(layout.offsets[0].1, 0);
        assert_eq!(layout.offsets[1].1, 0);
    }

    #[test]
    fn trailing_padding() {
        // struct { long l; char c; } -> size 16
        let env = env_with(
            "s",
            CompositeKind::Struct,
            &[
                ("l", CType::Long { sign: Signedness::Signed }),
                ("c", CType::char()),
            ],
        );
        assert_eq!(env.layout("s").unwrap().size, 16);
    }

    #[test]
    fn parse_basic_specs() {
        let td = IndexMap::new();
        assert_eq!(CType::parse("int", &td).unwrap(), CType::int());
        assert_eq!(
            CType::parse("unsigned long", &td).unwrap(),
            CType::unsigned_long()
        );
        assert_eq!(
            CType::parse("int*", &td).unwrap(),
            CType::pointer(CType::int())
        );
        assert_eq!(
            CType::parse("struct P*", &td).unwrap(),
            CType::pointer(CType::Struct("P".to_string()))
        );
        assert_eq!(CType::parse("enum Color", &td).unwrap(), CType::int());
    }

    #[test]
    fn parse_array_specs() {
        let td = IndexMap::new();
        assert_eq!(
            CType::parse("int[10]", &td).unwrap(),
            CType::Array {
                elem: Box::new(CType::int()),
                len: Some(10)
            }
        );
        // int[2][3] is two arrays of three ints.
        match CType::parse("int[2][3]", &td).unwrap() {
            CType::Array { elem, len } => {
                assert_eq!(len, Some(2));
                assert_eq!(
                    *elem,
                    CType::Array {
                        elem: Box::new(CType::int()),
                        len: Some(3)
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_function_pointer() {
        let td = IndexMap::new();
        match CType::parse("int (*)(int, int)", &td).unwrap() {
            CType::Pointer(inner) => match *inner {
                CType::Function { ret, params, .. } => {
                    assert_eq!(*ret, CType::int());
                    assert_eq!(params.len(), 2);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_typedef_resolution() {
        let mut td = IndexMap::new();
        td.insert("size_t".to_string(), CType::unsigned_long());
        assert_eq!(CType::parse("size_t", &td).unwrap(), CType::unsigned_long());
        assert_eq!(
            CType::parse("size_t*", &td).unwrap(),
            CType::pointer(CType::unsigned_long())
        );
        assert!(CType::parse("wobble", &td).is_err());
    }

    #[test]
    fn chunks() {
        assert_eq!(CType::char().chunk(), Some(Chunk::Int8s));
        assert_eq!(CType::int().chunk(), Some(Chunk::Int32));
        assert_eq!(CType::pointer(CType::int()).chunk(), Some(Chunk::Int64));
        assert_eq!(CType::Struct("s".into()).chunk(), None);
        assert_eq!(Chunk::Int16u.size(), 2);
    }
}
