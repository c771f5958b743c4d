//! Error taxonomy shared across the workspace.
//!
//! Each failure class is its own typed error; [`HubError`] gathers them for
//! callers that cross layers and converts via `#[from]`.

/// A state, action or decoded value failed its declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Wrong value '{value}' for type '{type_name}'")]
pub struct TypeMismatchError {
    /// Display form of the rejected value.
    pub value: String,
    /// Display name of the expected type (e.g. `range[0;100]`).
    pub type_name: String,
}

/// A component was constructed with configuration not matching its plugin.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Invalid configuration for component '{component}' of plugin '{plugin}' for configuration entry '{entry}': expected type '{expected}' but got '{actual}'"
)]
pub struct ConfigurationError {
    pub component: String,
    pub plugin: String,
    pub entry: String,
    pub expected: String,
    pub actual: String,
}

/// Structural problems in plugin declarations, detected while building a module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Class '{class}' looks like plugin but plugin declaration is missing")]
    MissingPluginDeclaration { class: String },

    #[error(
        "Bad action '{action}' on plugin '{class}': Expected primitive '{expected}' but got '{actual}'"
    )]
    ActionPrimitiveMismatch {
        action: String,
        class: String,
        expected: String,
        actual: String,
    },

    #[error("Duplicate member '{member}' on plugin '{class}'")]
    DuplicateMember { member: String, class: String },

    #[error("Duplicate plugin '{id}'")]
    DuplicatePlugin { id: String },

    #[error("Module '{module}' is already built")]
    ModuleAlreadyBuilt { module: String },

    #[error("Cannot begin module '{module}' while module '{open}' is being built")]
    ScopeAlreadyOpen { module: String, open: String },

    #[error("Invalid member type: {0}")]
    InvalidType(#[from] TypeError),
}

/// Invalid type parameters or an unparsable type display name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("invalid range [{min};{max}]: min is greater than max")]
    InvalidRange { min: i64, max: i64 },

    #[error("enum type requires at least one value")]
    EmptyEnum,

    #[error("invalid enum value '{0}'")]
    InvalidEnumValue(String),

    #[error("unknown type '{0}'")]
    Unknown(String),
}

/// Failure to encode or decode a value with a type codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("type '{type_name}' expects {expected} bytes, got {actual}")]
    Length {
        type_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("malformed payload for type '{type_name}'")]
    Malformed { type_name: String },

    #[error(transparent)]
    Value(#[from] TypeMismatchError),
}

/// Errors raised by a component host while constructing, acting or writing state.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),

    #[error("Unknown action '{action}' on component '{component}'")]
    UnknownAction { component: String, action: String },

    #[error("Unknown state '{state}' on component '{component}'")]
    UnknownState { component: String, state: String },

    #[error("Component '{0}' has been destroyed")]
    Destroyed(String),

    #[error("Plugin '{0}' has no implementation in this instance")]
    NotInstantiable(String),

    /// Failure reported by the driver code itself.
    #[error("driver error")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ComponentError {
    /// Wrap a driver-specific failure.
    pub fn driver(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Driver(err.into())
    }
}

/// A requested item does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} '{id}' not found")]
pub struct NotFoundError {
    pub kind: &'static str,
    pub id: String,
}

/// Workspace-wide error for operations crossing several layers.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("component '{0}' already exists")]
    AlreadyExists(String),
}

impl From<ConfigurationError> for HubError {
    fn from(err: ConfigurationError) -> Self {
        Self::Component(err.into())
    }
}

impl From<TypeMismatchError> for HubError {
    fn from(err: TypeMismatchError) -> Self {
        Self::Component(err.into())
    }
}
