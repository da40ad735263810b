//! Match keys and operand handles: field and method references, local slots and labels.
//!
//! [`FieldRef`] and [`MethodRef`] identify members of a known owning type. They are resolved
//! once at startup and are immutable afterwards; rewrite passes compare them against operands
//! and use them as operands of inserted instructions. A [`MethodRef`] also carries the shape
//! of the called routine's signature so the stack effect of a call can be derived without
//! consulting the host.
//!
//! [`LocalSlot`] and [`Label`] are allocated by [`crate::assembly::InstructionSequence`] and
//! never alias an existing slot or label of that sequence.

use std::fmt;

/// A reference to a field on a known owning type.
///
/// Equality compares owner, name and storage class; two references to the same member are
/// interchangeable match keys.
///
/// # Examples
///
/// ```rust
/// use ilweave::assembly::FieldRef;
///
/// let root_size = FieldRef::instance("CameraDriver", "rootSize");
/// assert!(!root_size.is_static());
/// assert_eq!(root_size.to_string(), "CameraDriver::rootSize");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    owner: String,
    name: String,
    is_static: bool,
}

impl FieldRef {
    /// Creates a reference to an instance field.
    #[must_use]
    pub fn instance(owner: impl Into<String>, name: impl Into<String>) -> Self {
        FieldRef {
            owner: owner.into(),
            name: name.into(),
            is_static: false,
        }
    }

    /// Creates a reference to a static field.
    #[must_use]
    pub fn new_static(owner: impl Into<String>, name: impl Into<String>) -> Self {
        FieldRef {
            owner: owner.into(),
            name: name.into(),
            is_static: true,
        }
    }

    /// Returns the owning type name.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if this is a static field.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.name)
    }
}

/// A reference to a callable routine on a known owning type.
///
/// Besides its identity (owner, name and parameter types) a method reference records
/// whether the routine takes a receiver and whether it returns a value, which is all the
/// stack verifier needs to know about a call.
///
/// # Examples
///
/// ```rust
/// use ilweave::assembly::MethodRef;
///
/// let lerp = MethodRef::new("Tools", "LerpRootSize")
///     .param("float")
///     .returns("float");
///
/// assert_eq!(lerp.pops(), 1);
/// assert_eq!(lerp.pushes(), 1);
/// assert_eq!(lerp.to_string(), "float Tools::LerpRootSize(float)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    owner: String,
    name: String,
    params: Vec<String>,
    return_type: Option<String>,
    has_this: bool,
}

impl MethodRef {
    /// Creates a reference to a static routine with no parameters and no return value.
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        MethodRef {
            owner: owner.into(),
            name: name.into(),
            params: Vec::new(),
            return_type: None,
            has_this: false,
        }
    }

    /// Appends a parameter type.
    #[must_use]
    pub fn param(mut self, type_name: impl Into<String>) -> Self {
        self.params.push(type_name.into());
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.return_type = Some(type_name.into());
        self
    }

    /// Marks the routine as an instance method taking a receiver.
    #[must_use]
    pub fn instance(mut self) -> Self {
        self.has_this = true;
        self
    }

    /// Returns the owning type name.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the routine name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter type names, excluding the receiver.
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Returns the return type name, or `None` for `void`.
    #[must_use]
    pub fn return_type(&self) -> Option<&str> {
        self.return_type.as_deref()
    }

    /// Returns `true` if the routine takes a receiver.
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.has_this
    }

    /// Number of evaluation stack items a call to this routine consumes.
    #[must_use]
    pub fn pops(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// Number of evaluation stack items a call to this routine produces.
    #[must_use]
    pub fn pushes(&self) -> usize {
        usize::from(self.return_type.is_some())
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ret = self.return_type.as_deref().unwrap_or("void");
        write!(
            f,
            "{ret} {}::{}({})",
            self.owner,
            self.name,
            self.params.join(", ")
        )
    }
}

/// A local variable slot of one method body.
///
/// Slots are declared through [`crate::assembly::InstructionSequence::declare_local`], which
/// hands out the next unused index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalSlot(pub(crate) u16);

impl LocalSlot {
    /// Returns the slot index.
    #[must_use]
    pub fn index(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for LocalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V_{}", self.0)
    }
}

/// A jump target marker.
///
/// A label is attached to the instruction it designates and referenced by branch operands.
/// Labels are allocated per sequence through
/// [`crate::assembly::InstructionSequence::define_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

impl Label {
    /// Returns the numeric id of this label.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_L{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_identity() {
        let a = FieldRef::instance("CameraDriver", "rootSize");
        let b = FieldRef::instance("CameraDriver", "rootSize");
        let s = FieldRef::new_static("CameraDriver", "rootSize");

        assert_eq!(a, b);
        assert_ne!(a, s);
        assert!(s.is_static());
    }

    #[test]
    fn test_method_stack_shape() {
        let setter = MethodRef::new("Patches", "SetRootSize")
            .param("CameraDriver")
            .param("float");
        assert_eq!(setter.pops(), 2);
        assert_eq!(setter.pushes(), 0);

        let getter = MethodRef::new("CameraDriver", "get_MyCamera")
            .returns("Camera")
            .instance();
        assert_eq!(getter.pops(), 1);
        assert_eq!(getter.pushes(), 1);
        assert!(getter.has_this());
    }

    #[test]
    fn test_method_identity_includes_signature() {
        let a = MethodRef::new("GenMapUI", "DrawThingLabel").param("Vector2");
        let b = MethodRef::new("GenMapUI", "DrawThingLabel").param("Vector3");
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let m = MethodRef::new("Patches", "ApplyZoom")
            .param("CameraDriver")
            .param("Camera");
        assert_eq!(m.to_string(), "void Patches::ApplyZoom(CameraDriver, Camera)");
        assert_eq!(LocalSlot(3).to_string(), "V_3");
        assert_eq!(Label(7).to_string(), "IL_L7");
    }
}
