//! The two orchestrated operations: [`get`] acquires a component's sources,
//! [`pack`] turns them into a package.

pub mod fpm;
pub mod get;
pub mod pack;

pub use fpm::{FpmRequest, PackagingRow};
pub use get::{get, plan, AcquireReport, GetOutcome, Step};
pub use pack::{pack, PackOutcome};

use crate::component::ComponentConfig;
use crate::context::PackContext;
use crate::error::Result;

/// `get` followed by `pack`.
pub fn make(
    config: &ComponentConfig,
    component: &str,
    ctx: &PackContext,
) -> Result<(GetOutcome, PackOutcome)> {
    let acquired = get(config, component, ctx)?;
    let packed = pack(config, component, ctx)?;
    Ok((acquired, packed))
}
