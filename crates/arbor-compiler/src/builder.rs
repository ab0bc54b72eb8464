//! The code-builder: the typed IR-construction API the compiler drives.
//!
//! The compiler never manufactures target code directly; it pushes
//! values, binds members, opens closures and applies operators through
//! [`CodeBuilder`]. Every pushed value has a statically known type the
//! compiler can query back without re-walking the surface tree, and
//! every mutating call may fail with a typed [`BuildError`] the
//! compiler interprets (candidate retry vs. hard failure).
//!
//! [`Checkpoint`]/[`CodeBuilder::rollback`] form the transactional
//! boundary of overload resolution: a failed candidate attempt restores
//! the op stream, the value stack and the constant pool to the state
//! captured at the attempt's entry.
//!
//! [`IrBuilder`] is the reference implementation: a linear op stream
//! over a typed value stack with a deduplicating constant pool.

use std::rc::Rc;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use arbor_core::{BuildError, Signature, StructDef, Type, Value, assignable, query_member};

/// Operators the builder applies to one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    /// Address-of, inserted by auto-referencing.
    AddrOf,
}

/// Operators the builder applies to two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// The annotation attached to a wrapped error value.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorNote {
    /// Source text of the wrapped call.
    pub text: String,
    pub file: String,
    pub line: u32,
    /// Name of the enclosing compiled unit.
    pub unit: String,
}

/// Index into the builder's constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstId(pub u32);

/// One op of the reference IR.
#[derive(Debug, Clone, PartialEq)]
pub enum Ir {
    Const(ConstId),
    /// Push the zero value of a type.
    Zero(Type),
    /// Push a type as a value.
    TypeRef(Type),
    LoadLocal(String),
    LoadGlobal(String),
    /// Bind a member of the top value.
    Member(String),
    /// Lift a raw `any`/map value into the query runtime's Node.
    LiftNode,
    Call {
        arity: usize,
        spread: bool,
    },
    /// Split a tuple into its elements.
    Unpack {
        count: usize,
    },
    /// Aggregate the top values into a tuple.
    Pack {
        count: usize,
    },
    /// Pop the top value into a named binding.
    Assign(String),
    Convert(Type),
    Unary(UnaryOp),
    Binary(BinaryOp),
    OpenScope,
    CloseScope,
    BeginClosure(Rc<Signature>),
    EndClosure,
    If,
    EndIf,
    Return {
        arity: usize,
    },
    Panic,
    WrapError(ErrorNote),
    MakeStruct {
        def: Rc<StructDef>,
        fields: usize,
    },
    MakeSlice {
        elem: Type,
        len: usize,
    },
    MakeArray {
        elem: Type,
        len: u64,
    },
    MakeMap {
        key: Type,
        value: Type,
        pairs: usize,
    },
}

/// Opaque token capturing the builder state at a candidate attempt's
/// entry: op stream length, value-stack depth, constant-pool size and
/// open closure frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    ops: usize,
    stack: usize,
    consts: usize,
    frames: usize,
}

/// The IR-construction API.
pub trait CodeBuilder {
    /// Push a constant.
    fn push_const(&mut self, value: Value);
    /// Push the zero value of a type.
    fn push_zero(&mut self, ty: &Type);
    /// Push a type as a value.
    fn push_type(&mut self, ty: Type);
    /// Push a local binding. The compiler's scope owns the type.
    fn load_local(&mut self, name: &str, ty: Type);
    /// Push a package-level symbol by qualified name.
    fn load_global(&mut self, name: &str, ty: Type);
    /// Bind a member of the top value, replacing it. Fails with
    /// `UnknownMember` when the receiver type has no such member.
    fn member(&mut self, name: &str) -> Result<Type, BuildError>;
    /// Bind a member whose type the caller has already resolved.
    /// Overload attempts use this to type the callee per candidate.
    fn bind_member(&mut self, name: &str, ty: Type) -> Result<(), BuildError>;
    /// Lift the top `any`/map value into a query Node.
    fn lift_node(&mut self) -> Result<(), BuildError>;
    /// Call the value beneath `arity` arguments. Checks arity (with
    /// variadic and spread rules) and argument assignability; pushes
    /// the call's result.
    fn call(&mut self, arity: usize, spread: bool) -> Result<Type, BuildError>;
    /// Split the top tuple value into its elements; returns the count.
    fn unpack(&mut self) -> Result<usize, BuildError>;
    /// Aggregate the top `count` values into one tuple value.
    fn pack(&mut self, count: usize) -> Result<Type, BuildError>;
    /// Pop the top value into a named binding.
    fn assign(&mut self, name: &str) -> Result<(), BuildError>;
    /// Convert or assert the top value to a type.
    fn convert(&mut self, to: &Type) -> Result<(), BuildError>;
    fn unary(&mut self, op: UnaryOp) -> Result<Type, BuildError>;
    fn binary(&mut self, op: BinaryOp) -> Result<Type, BuildError>;
    fn open_scope(&mut self);
    fn close_scope(&mut self);
    /// Start a closure with the given signature; ops until the
    /// matching `end_closure` form its body.
    fn begin_closure(&mut self, sig: Rc<Signature>);
    /// Finish the innermost closure and push its function value.
    fn end_closure(&mut self) -> Result<Type, BuildError>;
    /// Branch on the top boolean. Branch arms must be stack-neutral.
    fn branch_if(&mut self) -> Result<(), BuildError>;
    fn branch_end(&mut self);
    /// Return `arity` values from the innermost closure, or from the
    /// compiled unit when no closure is open.
    fn ret(&mut self, arity: usize) -> Result<(), BuildError>;
    /// Invoke the target's panic primitive with the top value.
    fn panic_op(&mut self) -> Result<(), BuildError>;
    /// Wrap the top error value with a diagnostic annotation.
    fn wrap_error(&mut self, note: ErrorNote) -> Result<(), BuildError>;
    fn make_struct(&mut self, def: Rc<StructDef>, fields: usize) -> Result<Type, BuildError>;
    fn make_slice(&mut self, elem: Type, len: usize) -> Result<Type, BuildError>;
    fn make_array(&mut self, elem: Type, len: u64) -> Result<Type, BuildError>;
    fn make_map(&mut self, key: Type, value: Type, pairs: usize) -> Result<Type, BuildError>;
    /// Type of the top value.
    fn top_type(&self) -> Option<&Type>;
    /// Type of the value `depth` positions below the top.
    fn type_at(&self, depth: usize) -> Option<&Type>;
    /// Current value-stack depth.
    fn depth(&self) -> usize;
    fn checkpoint(&self) -> Checkpoint;
    fn rollback(&mut self, cp: Checkpoint);
    /// Constraint-solving inference: unify a generic signature's
    /// parameters against argument types (`None` marks a deferred
    /// lambda argument) and return the instantiated signature.
    fn infer_signature(
        &self,
        sig: &Signature,
        args: &[Option<Type>],
    ) -> Result<Signature, BuildError>;
}

/// Key for constant deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Unit,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Nil,
}

impl ConstKey {
    fn of(value: &Value) -> Self {
        match value {
            Value::Unit => ConstKey::Unit,
            Value::Bool(b) => ConstKey::Bool(*b),
            Value::Int(i) => ConstKey::Int(*i),
            Value::Float(f) => ConstKey::Float(OrderedFloat(*f)),
            Value::Str(s) => ConstKey::Str(s.clone()),
            Value::Nil => ConstKey::Nil,
        }
    }
}

/// Deduplicating constant pool.
#[derive(Debug, Default)]
pub struct ConstantPool {
    values: Vec<Value>,
    index: FxHashMap<ConstKey, ConstId>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant, reusing an existing slot for equal values.
    pub fn add(&mut self, value: Value) -> ConstId {
        let key = ConstKey::of(&value);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = ConstId(self.values.len() as u32);
        self.values.push(value);
        self.index.insert(key, id);
        id
    }

    pub fn get(&self, id: ConstId) -> Option<&Value> {
        self.values.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
        self.index.retain(|_, id| (id.0 as usize) < len);
    }
}

struct ClosureFrame {
    sig: Rc<Signature>,
    base_depth: usize,
}

/// The reference code-builder: a linear op stream over a typed stack.
pub struct IrBuilder {
    ops: Vec<Ir>,
    stack: Vec<Type>,
    constants: ConstantPool,
    frames: Vec<ClosureFrame>,
    unit_results: Vec<Type>,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            stack: Vec::new(),
            constants: ConstantPool::new(),
            frames: Vec::new(),
            unit_results: Vec::new(),
        }
    }

    /// Declare the compiled unit's result types; `ret` outside any
    /// closure validates against these.
    pub fn begin_unit(&mut self, results: Vec<Type>) {
        self.unit_results = results;
    }

    /// The emitted op stream.
    pub fn ops(&self) -> &[Ir] {
        &self.ops
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    /// Finish and hand out the op stream and constant pool.
    pub fn finish(self) -> (Vec<Ir>, ConstantPool) {
        (self.ops, self.constants)
    }

    fn pop(&mut self) -> Result<Type, BuildError> {
        self.stack.pop().ok_or(BuildError::StackUnderflow)
    }

    fn mismatch(expected: &Type, found: &Type) -> BuildError {
        BuildError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Result types `ret` must currently satisfy.
    fn return_types(&self) -> &[Type] {
        match self.frames.last() {
            Some(frame) => &frame.sig.results,
            None => &self.unit_results,
        }
    }

    /// Look up a member on a receiver type without mutating anything.
    fn member_type(&self, receiver: &Type, name: &str) -> Option<Type> {
        if let Some(def) = receiver.struct_def() {
            if let Some((_, field)) = def.field(name) {
                return Some(field.ty.clone());
            }
            if let Some(method) = def.methods_named(name).first() {
                return Some(Type::Func(Rc::clone(&method.sig)));
            }
            return None;
        }
        match receiver {
            Type::Node | Type::NodeSet => query_member(name).map(Type::func),
            _ => None,
        }
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeBuilder for IrBuilder {
    fn push_const(&mut self, value: Value) {
        let ty = value.type_of();
        let id = self.constants.add(value);
        self.ops.push(Ir::Const(id));
        self.stack.push(ty);
    }

    fn push_zero(&mut self, ty: &Type) {
        self.ops.push(Ir::Zero(ty.clone()));
        self.stack.push(ty.clone());
    }

    fn push_type(&mut self, ty: Type) {
        self.ops.push(Ir::TypeRef(ty.clone()));
        self.stack.push(Type::TypeValue(Rc::new(ty)));
    }

    fn load_local(&mut self, name: &str, ty: Type) {
        self.ops.push(Ir::LoadLocal(name.to_string()));
        self.stack.push(ty);
    }

    fn load_global(&mut self, name: &str, ty: Type) {
        self.ops.push(Ir::LoadGlobal(name.to_string()));
        self.stack.push(ty);
    }

    fn member(&mut self, name: &str) -> Result<Type, BuildError> {
        let receiver = self.stack.last().ok_or(BuildError::StackUnderflow)?;
        let ty = self
            .member_type(receiver, name)
            .ok_or_else(|| BuildError::UnknownMember {
                name: name.to_string(),
                on: receiver.to_string(),
            })?;
        self.stack.pop();
        self.stack.push(ty.clone());
        self.ops.push(Ir::Member(name.to_string()));
        Ok(ty)
    }

    fn bind_member(&mut self, name: &str, ty: Type) -> Result<(), BuildError> {
        self.pop()?;
        self.stack.push(ty);
        self.ops.push(Ir::Member(name.to_string()));
        Ok(())
    }

    fn lift_node(&mut self) -> Result<(), BuildError> {
        let top = self.stack.last().ok_or(BuildError::StackUnderflow)?;
        if !top.needs_lift() {
            return Err(BuildError::InvalidOp {
                message: format!("cannot lift value of type '{top}' into a Node"),
            });
        }
        self.stack.pop();
        self.stack.push(Type::Node);
        self.ops.push(Ir::LiftNode);
        Ok(())
    }

    fn call(&mut self, arity: usize, spread: bool) -> Result<Type, BuildError> {
        if self.stack.len() < arity + 1 {
            return Err(BuildError::StackUnderflow);
        }
        let callee_at = self.stack.len() - arity - 1;
        let sig = match &self.stack[callee_at] {
            Type::Func(sig) => Rc::clone(sig),
            other => {
                return Err(BuildError::NotCallable {
                    ty: other.to_string(),
                });
            }
        };
        if sig.is_generic() {
            return Err(BuildError::InvalidOp {
                message: format!("call of uninstantiated generic signature '{sig}'"),
            });
        }

        let params = &sig.params;
        if sig.is_variadic() {
            let fixed = params.len() - 1;
            if spread {
                if arity != params.len() {
                    return Err(BuildError::Arity {
                        have: arity,
                        want: params.len(),
                    });
                }
            } else if arity < fixed {
                return Err(BuildError::Arity {
                    have: arity,
                    want: fixed,
                });
            }
        } else {
            if spread {
                return Err(BuildError::InvalidOp {
                    message: "spread argument to non-variadic call".to_string(),
                });
            }
            if arity != params.len() {
                return Err(BuildError::Arity {
                    have: arity,
                    want: params.len(),
                });
            }
        }

        // Check each argument against its parameter; the variadic tail
        // checks against the element type unless spread supplied the
        // slice whole.
        for i in 0..arity {
            let arg = &self.stack[callee_at + 1 + i];
            let expected = if sig.is_variadic() && i + 1 >= params.len() {
                let last = params.last().expect("variadic signature has parameters");
                if spread && i + 1 == arity {
                    last.clone()
                } else {
                    match last {
                        Type::Slice(elem) => (**elem).clone(),
                        other => other.clone(),
                    }
                }
            } else {
                params[i].clone()
            };
            if !assignable(arg, &expected) {
                return Err(Self::mismatch(&expected, arg));
            }
        }

        self.stack.truncate(callee_at);
        let result = sig.result_type();
        self.stack.push(result.clone());
        self.ops.push(Ir::Call { arity, spread });
        Ok(result)
    }

    fn unpack(&mut self) -> Result<usize, BuildError> {
        let top = self.pop()?;
        match top {
            Type::Tuple(elems) => {
                let count = elems.len();
                self.stack.extend(elems);
                self.ops.push(Ir::Unpack { count });
                Ok(count)
            }
            other => {
                self.stack.push(other.clone());
                Err(BuildError::InvalidOp {
                    message: format!("unpack of non-tuple value '{other}'"),
                })
            }
        }
    }

    fn pack(&mut self, count: usize) -> Result<Type, BuildError> {
        if self.stack.len() < count {
            return Err(BuildError::StackUnderflow);
        }
        let elems = self.stack.split_off(self.stack.len() - count);
        let ty = Type::Tuple(elems);
        self.stack.push(ty.clone());
        self.ops.push(Ir::Pack { count });
        Ok(ty)
    }

    fn assign(&mut self, name: &str) -> Result<(), BuildError> {
        self.pop()?;
        self.ops.push(Ir::Assign(name.to_string()));
        Ok(())
    }

    fn convert(&mut self, to: &Type) -> Result<(), BuildError> {
        let from = self.pop()?;
        let ok = assignable(&from, to) || matches!(from, Type::Any) || matches!(to, Type::Any);
        if !ok {
            self.stack.push(from.clone());
            return Err(Self::mismatch(to, &from));
        }
        self.stack.push(to.clone());
        self.ops.push(Ir::Convert(to.clone()));
        Ok(())
    }

    fn unary(&mut self, op: UnaryOp) -> Result<Type, BuildError> {
        let operand = self.pop()?;
        let result = match op {
            UnaryOp::Neg => match operand {
                Type::Int | Type::Float => operand,
                other => {
                    self.stack.push(other.clone());
                    return Err(Self::mismatch(&Type::Int, &other));
                }
            },
            UnaryOp::Not => match operand {
                Type::Bool => Type::Bool,
                other => {
                    self.stack.push(other.clone());
                    return Err(Self::mismatch(&Type::Bool, &other));
                }
            },
            UnaryOp::AddrOf => Type::pointer(operand),
        };
        self.stack.push(result.clone());
        self.ops.push(Ir::Unary(op));
        Ok(result)
    }

    fn binary(&mut self, op: BinaryOp) -> Result<Type, BuildError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = match op {
            BinaryOp::Add => match (&left, &right) {
                (Type::Int, Type::Int) => Type::Int,
                (Type::Float, Type::Float) => Type::Float,
                (Type::Str, Type::Str) => Type::Str,
                _ => {
                    self.stack.push(left.clone());
                    self.stack.push(right.clone());
                    return Err(Self::mismatch(&left, &right));
                }
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => match (&left, &right) {
                (Type::Int, Type::Int) => Type::Int,
                (Type::Float, Type::Float) => Type::Float,
                _ => {
                    self.stack.push(left.clone());
                    self.stack.push(right.clone());
                    return Err(Self::mismatch(&left, &right));
                }
            },
            BinaryOp::Eq | BinaryOp::Ne => {
                if assignable(&left, &right)
                    || assignable(&right, &left)
                    || query_scalar_comparison(&left, &right)
                {
                    Type::Bool
                } else {
                    self.stack.push(left.clone());
                    self.stack.push(right.clone());
                    return Err(Self::mismatch(&left, &right));
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (&left, &right) {
                (Type::Int, Type::Int) | (Type::Float, Type::Float) | (Type::Str, Type::Str) => {
                    Type::Bool
                }
                _ if query_scalar_comparison(&left, &right) => Type::Bool,
                _ => {
                    self.stack.push(left.clone());
                    self.stack.push(right.clone());
                    return Err(Self::mismatch(&left, &right));
                }
            },
            BinaryOp::And | BinaryOp::Or => match (&left, &right) {
                (Type::Bool, Type::Bool) => Type::Bool,
                _ => {
                    self.stack.push(left.clone());
                    self.stack.push(right.clone());
                    return Err(Self::mismatch(&Type::Bool, &right));
                }
            },
        };
        self.stack.push(result.clone());
        self.ops.push(Ir::Binary(op));
        Ok(result)
    }

    fn open_scope(&mut self) {
        self.ops.push(Ir::OpenScope);
    }

    fn close_scope(&mut self) {
        self.ops.push(Ir::CloseScope);
    }

    fn begin_closure(&mut self, sig: Rc<Signature>) {
        self.frames.push(ClosureFrame {
            sig: Rc::clone(&sig),
            base_depth: self.stack.len(),
        });
        self.ops.push(Ir::BeginClosure(sig));
    }

    fn end_closure(&mut self) -> Result<Type, BuildError> {
        let frame = self.frames.pop().ok_or(BuildError::InvalidOp {
            message: "end_closure without begin_closure".to_string(),
        })?;
        self.stack.truncate(frame.base_depth);
        let ty = Type::Func(Rc::clone(&frame.sig));
        self.stack.push(ty.clone());
        self.ops.push(Ir::EndClosure);
        Ok(ty)
    }

    fn branch_if(&mut self) -> Result<(), BuildError> {
        let cond = self.pop()?;
        if cond != Type::Bool {
            self.stack.push(cond.clone());
            return Err(Self::mismatch(&Type::Bool, &cond));
        }
        self.ops.push(Ir::If);
        Ok(())
    }

    fn branch_end(&mut self) {
        self.ops.push(Ir::EndIf);
    }

    fn ret(&mut self, arity: usize) -> Result<(), BuildError> {
        let want = self.return_types().to_vec();
        if arity != want.len() {
            return Err(BuildError::Arity {
                have: arity,
                want: want.len(),
            });
        }
        if self.stack.len() < arity {
            return Err(BuildError::StackUnderflow);
        }
        let base = self.stack.len() - arity;
        for (value, expected) in self.stack[base..].iter().zip(&want) {
            if !assignable(value, expected) {
                return Err(Self::mismatch(expected, value));
            }
        }
        self.stack.truncate(base);
        self.ops.push(Ir::Return { arity });
        Ok(())
    }

    fn panic_op(&mut self) -> Result<(), BuildError> {
        self.pop()?;
        self.ops.push(Ir::Panic);
        Ok(())
    }

    fn wrap_error(&mut self, note: ErrorNote) -> Result<(), BuildError> {
        let top = self.stack.last().ok_or(BuildError::StackUnderflow)?;
        if *top != Type::Error {
            return Err(Self::mismatch(&Type::Error, top));
        }
        self.ops.push(Ir::WrapError(note));
        Ok(())
    }

    fn make_struct(&mut self, def: Rc<StructDef>, fields: usize) -> Result<Type, BuildError> {
        if self.stack.len() < fields {
            return Err(BuildError::StackUnderflow);
        }
        self.stack.truncate(self.stack.len() - fields);
        let ty = Type::Struct(Rc::clone(&def));
        self.stack.push(ty.clone());
        self.ops.push(Ir::MakeStruct { def, fields });
        Ok(ty)
    }

    fn make_slice(&mut self, elem: Type, len: usize) -> Result<Type, BuildError> {
        if self.stack.len() < len {
            return Err(BuildError::StackUnderflow);
        }
        self.stack.truncate(self.stack.len() - len);
        let ty = Type::slice(elem.clone());
        self.stack.push(ty.clone());
        self.ops.push(Ir::MakeSlice { elem, len });
        Ok(ty)
    }

    fn make_array(&mut self, elem: Type, len: u64) -> Result<Type, BuildError> {
        if (self.stack.len() as u64) < len {
            return Err(BuildError::StackUnderflow);
        }
        self.stack.truncate(self.stack.len() - len as usize);
        let ty = Type::array(len, elem.clone());
        self.stack.push(ty.clone());
        self.ops.push(Ir::MakeArray { elem, len });
        Ok(ty)
    }

    fn make_map(&mut self, key: Type, value: Type, pairs: usize) -> Result<Type, BuildError> {
        if self.stack.len() < pairs * 2 {
            return Err(BuildError::StackUnderflow);
        }
        self.stack.truncate(self.stack.len() - pairs * 2);
        let ty = Type::map(key.clone(), value.clone());
        self.stack.push(ty.clone());
        self.ops.push(Ir::MakeMap { key, value, pairs });
        Ok(ty)
    }

    fn top_type(&self) -> Option<&Type> {
        self.stack.last()
    }

    fn type_at(&self, depth: usize) -> Option<&Type> {
        if depth < self.stack.len() {
            self.stack.get(self.stack.len() - 1 - depth)
        } else {
            None
        }
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            ops: self.ops.len(),
            stack: self.stack.len(),
            consts: self.constants.len(),
            frames: self.frames.len(),
        }
    }

    fn rollback(&mut self, cp: Checkpoint) {
        self.ops.truncate(cp.ops);
        self.stack.truncate(cp.stack);
        self.constants.truncate(cp.consts);
        self.frames.truncate(cp.frames);
    }

    fn infer_signature(
        &self,
        sig: &Signature,
        args: &[Option<Type>],
    ) -> Result<Signature, BuildError> {
        let mut bindings: FxHashMap<String, Type> = FxHashMap::default();
        for (i, arg) in args.iter().enumerate() {
            let Some(arg_ty) = arg else { continue };
            let param = if sig.is_variadic() && i + 1 >= sig.params.len() {
                match sig.params.last() {
                    Some(Type::Slice(elem)) => (**elem).clone(),
                    Some(other) => other.clone(),
                    None => continue,
                }
            } else {
                match sig.params.get(i) {
                    Some(p) => p.clone(),
                    None => continue,
                }
            };
            unify(&param, arg_ty, &mut bindings)?;
        }
        let inst = sig.instantiate(&bindings);
        if inst.is_generic() {
            let name = inst
                .type_params
                .first()
                .cloned()
                .unwrap_or_else(|| "?".to_string());
            return Err(BuildError::Uninferable { name });
        }
        Ok(inst)
    }
}

/// Query values compare against scalars: the runtime reads the node's
/// (or the set's first node's) value for the comparison. This is what
/// lets selector predicates write `name == "Ken"` directly.
fn query_scalar_comparison(left: &Type, right: &Type) -> bool {
    let scalar = |t: &Type| matches!(t, Type::Bool | Type::Int | Type::Float | Type::Str);
    let query = |t: &Type| matches!(t, Type::Node | Type::NodeSet);
    (query(left) && scalar(right)) || (scalar(left) && query(right))
}

/// Structural unification of a parameter type against an argument type.
fn unify(
    param: &Type,
    arg: &Type,
    bindings: &mut FxHashMap<String, Type>,
) -> Result<(), BuildError> {
    match (param, arg) {
        (Type::Param(name), _) => match bindings.get(name) {
            Some(bound) if bound == arg => Ok(()),
            Some(bound) => Err(BuildError::TypeMismatch {
                expected: bound.to_string(),
                found: arg.to_string(),
            }),
            None => {
                bindings.insert(name.clone(), arg.clone());
                Ok(())
            }
        },
        (Type::Pointer(p), Type::Pointer(a))
        | (Type::Slice(p), Type::Slice(a))
        | (Type::TypeValue(p), Type::TypeValue(a)) => unify(p, a, bindings),
        (Type::Array(n, p), Type::Array(m, a)) if n == m => unify(p, a, bindings),
        (Type::Map(pk, pv), Type::Map(ak, av)) => {
            unify(pk, ak, bindings)?;
            unify(pv, av, bindings)
        }
        (Type::Func(p), Type::Func(a))
            if p.params.len() == a.params.len() && p.results.len() == a.results.len() =>
        {
            for (pp, ap) in p.params.iter().zip(&a.params) {
                unify(pp, ap, bindings)?;
            }
            for (pr, ar) in p.results.iter().zip(&a.results) {
                unify(pr, ar, bindings)?;
            }
            Ok(())
        }
        (Type::Tuple(ps), Type::Tuple(asx)) if ps.len() == asx.len() => {
            for (p, a) in ps.iter().zip(asx) {
                unify(p, a, bindings)?;
            }
            Ok(())
        }
        _ => {
            if assignable(arg, param) {
                Ok(())
            } else {
                Err(BuildError::TypeMismatch {
                    expected: param.to_string(),
                    found: arg.to_string(),
                })
            }
        }
    }
}
