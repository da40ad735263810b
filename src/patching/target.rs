//! Identity of a patchable method.

use std::fmt;

use strum::Display;

/// What kind of member a [`TargetKey`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum MemberKind {
    /// Ordinary method
    #[strum(serialize = "method")]
    Method,
    /// Property getter
    #[strum(serialize = "getter")]
    Getter,
    /// Property setter
    #[strum(serialize = "setter")]
    Setter,
}

/// Identifies a method in the host by owning type, member name and parameter signature.
///
/// Overloads are told apart by their parameter type names. Property accessors are named by
/// the property and a [`MemberKind`].
///
/// ```rust
/// use ilweave::patching::TargetKey;
///
/// let update = TargetKey::method("CameraDriver", "Update");
/// let zoom = TargetKey::getter("CameraDriver", "CurrentZoom");
///
/// assert_eq!(update.to_string(), "CameraDriver::Update()");
/// assert_eq!(zoom.to_string(), "CameraDriver::get_CurrentZoom()");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    owner: String,
    name: String,
    params: Vec<String>,
    kind: MemberKind,
}

impl TargetKey {
    /// Creates a key for a method without parameters.
    #[must_use]
    pub fn method(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_kind(owner, name, MemberKind::Method)
    }

    /// Creates a key for a property getter.
    #[must_use]
    pub fn getter(owner: impl Into<String>, property: impl Into<String>) -> Self {
        Self::with_kind(owner, property, MemberKind::Getter)
    }

    /// Creates a key for a property setter.
    #[must_use]
    pub fn setter(owner: impl Into<String>, property: impl Into<String>) -> Self {
        Self::with_kind(owner, property, MemberKind::Setter)
    }

    fn with_kind(owner: impl Into<String>, name: impl Into<String>, kind: MemberKind) -> Self {
        TargetKey {
            owner: owner.into(),
            name: name.into(),
            params: Vec::new(),
            kind,
        }
    }

    /// Appends a parameter type to the signature.
    #[must_use]
    pub fn param(mut self, type_name: impl Into<String>) -> Self {
        self.params.push(type_name.into());
        self
    }

    /// Returns the owning type name.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the member name (the property name for accessors).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter type names.
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Returns the member kind.
    #[must_use]
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    /// Name of the compiled routine, with the `get_`/`set_` prefix for accessors.
    #[must_use]
    pub fn routine_name(&self) -> String {
        match self.kind {
            MemberKind::Method => self.name.clone(),
            MemberKind::Getter => format!("get_{}", self.name),
            MemberKind::Setter => format!("set_{}", self.name),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.owner,
            self.routine_name(),
            self.params.join(", ")
        )
    }
}
