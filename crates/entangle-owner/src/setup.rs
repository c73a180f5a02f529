//! Registering the owner types.

use entangle_store::{Registry, Transient};

use crate::error::{OwnerError, Result};
use crate::messages::{MyOwners, YouHave, I_HAVE, MY_OWNERS, YOU_HAVE};
use crate::owner::{owner_storage, SyncOwner, EPOCH, SYNC_OWNER};

/// Declare the schemas of the internal owner types.
pub fn declare_internal_schema(registry: &Registry) -> Result<()> {
    registry.declare(SYNC_OWNER, ["id"], ["id", EPOCH])?;
    registry.declare(I_HAVE, ["serial", EPOCH, "_sync_owner"], ["serial", EPOCH])?;
    registry.declare(YOU_HAVE, ["serial", EPOCH, "_sync_owner"], ["serial", EPOCH])?;
    registry.declare(MY_OWNERS, Vec::<String>::new(), ["owners"])?;
    Ok(())
}

/// Register owner handling on a registry whose internal schema is declared.
pub fn setup_persistence(registry: &Registry) -> Result<()> {
    for name in [SYNC_OWNER, I_HAVE, YOU_HAVE, MY_OWNERS] {
        if !registry.is_declared(name) {
            return Err(OwnerError::MissingInternalSchema(name));
        }
    }
    registry.register(SYNC_OWNER, SyncOwner::new())?;
    registry.register(I_HAVE, Transient)?;
    registry.register(YOU_HAVE, YouHave)?;
    registry.register(MY_OWNERS, MyOwners)?;
    Ok(())
}

/// Register an application owner type. It shares the identity map of
/// `SyncOwner`, so [`setup_persistence`] must run first.
pub fn register_owner_type(registry: &Registry, name: &str) -> Result<()> {
    let storage = owner_storage(registry).ok_or(OwnerError::NotSetUp)?;
    registry.register(name, SyncOwner::sharing(storage))?;
    Ok(())
}
