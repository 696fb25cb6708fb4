//! Shop resolution for inbound requests.
//!
//! Webhooks and API calls identify a shop loosely: sometimes a domain,
//! sometimes a numeric ID, sometimes nothing at all. The resolver walks a
//! fixed fallback chain (domain, then ID, then the oldest installed shop)
//! and logs whenever it has to fall back, so misrouted requests stay
//! visible in the logs without failing the work.

use anyhow::{Context, Result};
use sqlx::PgPool;

use super::models::Shop;

/// Loose shop identification carried by a request payload.
#[derive(Debug, Clone, Default)]
pub struct ShopHint {
    pub domain: Option<String>,
    pub id: Option<i64>,
}

/// Resolve a hint to an installed shop, falling back step by step.
/// Errors only when no shop is installed at all.
pub async fn resolve_shop(hint: &ShopHint, pool: &PgPool) -> Result<Shop> {
    if let Some(domain) = hint.domain.as_deref().filter(|d| !d.is_empty()) {
        if let Some(shop) = Shop::find_by_domain(domain, pool).await? {
            return Ok(shop);
        }
        tracing::warn!(domain = %domain, "no shop matches hinted domain, falling back");
    }

    if let Some(id) = hint.id {
        if let Some(shop) = Shop::find_by_id(id, pool).await? {
            return Ok(shop);
        }
        tracing::warn!(shop_id = id, "no shop matches hinted id, falling back");
    }

    let shop = Shop::find_first(pool)
        .await?
        .context("no shops installed")?;
    if hint.domain.is_some() || hint.id.is_some() {
        tracing::warn!(
            shop_id = shop.id,
            myshopify_domain = %shop.myshopify_domain,
            "shop hint did not resolve, using first installed shop"
        );
    }
    Ok(shop)
}
