//! Methods: bytecode plus feedback vector

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::feedback::FeedbackVector;
use crate::instruction::{BytecodeReader, Instruction};

/// Identifier of a method within its compilation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MethodId(pub u32);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{}", self.0)
    }
}

/// Identifier of a compilation unit (bytecode file)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct AbcId(pub u32);

/// Kind of function a method implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Ordinary function
    #[default]
    Normal,
    /// Arrow function
    Arrow,
    /// Object or class method
    Method,
    /// Class constructor
    ClassConstructor,
    /// Derived class constructor
    DerivedConstructor,
    /// Generator function
    Generator,
    /// Async function
    Async,
    /// Builtin implemented by the runtime
    Builtin,
}

impl FunctionKind {
    /// Can be called with `new`
    pub fn is_constructor(self) -> bool {
        matches!(
            self,
            Self::Normal | Self::ClassConstructor | Self::DerivedConstructor | Self::Builtin
        )
    }

    /// Class constructor, base or derived
    pub fn is_class_constructor(self) -> bool {
        matches!(self, Self::ClassConstructor | Self::DerivedConstructor)
    }
}

/// A bytecode method
#[derive(Debug, Clone)]
pub struct Method {
    /// Method id
    pub id: MethodId,
    /// Owning compilation unit
    pub abc: AbcId,
    /// Method name (empty for anonymous)
    pub name: Option<Arc<str>>,
    /// Function kind
    pub kind: FunctionKind,
    /// Encoded instructions
    pub bytecode: Arc<[u8]>,
    /// IC slots written by the interpreter
    pub feedback: FeedbackVector,
}

impl Method {
    /// Create a new method builder
    pub fn builder() -> MethodBuilder {
        MethodBuilder::default()
    }

    /// Get the method name or `<anonymous>`
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Decode the instruction stream
    pub fn instructions(&self) -> BytecodeReader<'_> {
        BytecodeReader::new(&self.bytecode)
    }

    /// Decode the instruction at `offset`, if one starts there
    pub fn instruction_at(&self, offset: u32) -> Option<Instruction<'_>> {
        self.instructions()
            .map_while(|insn| insn.ok())
            .find(|insn| insn.offset == offset)
    }
}

/// Builder for [`Method`]
#[derive(Debug, Default)]
pub struct MethodBuilder {
    id: MethodId,
    abc: AbcId,
    name: Option<Arc<str>>,
    kind: FunctionKind,
    bytecode: Vec<u8>,
    feedback_slots: usize,
}

impl MethodBuilder {
    /// Set method id
    pub fn id(mut self, id: MethodId) -> Self {
        self.id = id;
        self
    }

    /// Set compilation unit
    pub fn abc(mut self, abc: AbcId) -> Self {
        self.abc = abc;
        self
    }

    /// Set method name
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    /// Set function kind
    pub fn kind(mut self, kind: FunctionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set encoded instructions
    pub fn bytecode(mut self, bytecode: Vec<u8>) -> Self {
        self.bytecode = bytecode;
        self
    }

    /// Set feedback vector size
    pub fn feedback_slots(mut self, count: usize) -> Self {
        self.feedback_slots = count;
        self
    }

    /// Build the method
    pub fn build(self) -> Method {
        Method {
            id: self.id,
            abc: self.abc,
            name: self.name,
            kind: self.kind,
            bytecode: self.bytecode.into(),
            feedback: FeedbackVector::new(self.feedback_slots),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BytecodeBuilder, Opcode, SlotId};

    #[test]
    fn test_method_builder() {
        let mut code = BytecodeBuilder::new();
        code.op(Opcode::LdObjByName, Some(SlotId(0)))
            .op(Opcode::Return, None);
        let method = Method::builder()
            .id(MethodId(7))
            .name("getX")
            .kind(FunctionKind::Method)
            .bytecode(code.finish())
            .feedback_slots(2)
            .build();

        assert_eq!(method.display_name(), "getX");
        assert_eq!(method.feedback.len(), 2);
        assert_eq!(method.instructions().count(), 2);
        assert_eq!(method.instruction_at(4).map(|i| i.opcode), Some(Opcode::Return));
        assert!(method.instruction_at(1).is_none());
    }

    #[test]
    fn test_anonymous_method() {
        let method = Method::builder().build();
        assert_eq!(method.display_name(), "<anonymous>");
        assert!(method.feedback.is_empty());
    }

    #[test]
    fn test_function_kind_predicates() {
        assert!(FunctionKind::ClassConstructor.is_constructor());
        assert!(FunctionKind::DerivedConstructor.is_class_constructor());
        assert!(!FunctionKind::Arrow.is_constructor());
        assert!(!FunctionKind::Normal.is_class_constructor());
    }
}
