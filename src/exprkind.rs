//! The expression-kind bitset threaded up every level of the precedence
//! ladder, tracking whether the code just emitted left an address or a
//! value on top of stack, performed an assignment, or is a compile-time
//! constant.
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExprKind: u8 {
        /// The emitted code performed an assignment.
        const ASSIGN = 0b001;
        /// Top-of-stack is a value, not an address. Absence means lvalue.
        const RVALUE = 0b010;
        /// The value is a compile-time constant literal.
        const CONST  = 0b100;
    }
}

impl ExprKind {
    pub fn is_lvalue(self) -> bool {
        !self.contains(ExprKind::RVALUE)
    }
}

impl Default for ExprKind {
    fn default() -> Self {
        ExprKind::RVALUE
    }
}
