//! Request context resolution and snapshot enrichment

use scoring_core::{
    Customer, EntityDirectory, Error, EvaluationContext, Result, TransactionSnapshot,
};
use std::sync::Arc;
use tracing::warn;

/// Resolves the customer and merchant of a transaction
pub struct ContextBuilder {
    directory: Arc<dyn EntityDirectory>,
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder").finish()
    }
}

impl ContextBuilder {
    /// Create new context builder
    pub fn new(directory: Arc<dyn EntityDirectory>) -> Self {
        Self { directory }
    }

    /// Build the evaluation context.
    ///
    /// The customer is looked up by ID, then by payer email; a directory
    /// failure leaves the transaction a guest. Only a customer found by ID
    /// can be whitelisted. A missing merchant is an error.
    pub async fn build(
        &self,
        snapshot: &TransactionSnapshot,
        ip_address: Option<String>,
        device_fingerprint: Option<String>,
    ) -> Result<EvaluationContext> {
        let merchant = self
            .directory
            .get_merchant(snapshot.merchant_id)
            .await?
            .ok_or_else(|| Error::UnresolvedIdentity(format!("merchant {}", snapshot.merchant_id)))?;

        let customer = match self.resolve_customer(snapshot).await {
            Ok(customer) => customer,
            Err(e) => {
                warn!("Customer lookup failed for transaction {}: {}", snapshot.id, e);
                None
            }
        };

        let whitelisted = is_whitelisted(customer.as_ref(), snapshot, &merchant.settings.vip_customers);

        Ok(EvaluationContext {
            customer,
            merchant,
            ip_address,
            device_fingerprint,
            whitelisted,
        })
    }

    async fn resolve_customer(&self, snapshot: &TransactionSnapshot) -> Result<Option<Customer>> {
        if let Some(id) = snapshot.customer_id {
            if let Some(customer) = self.directory.get_customer(id).await? {
                return Ok(Some(customer));
            }
        }

        match snapshot.normalized_email() {
            Some(email) if !email.is_empty() => self.directory.find_customer_by_email(&email).await,
            _ => Ok(None),
        }
    }
}

/// Whitelisting needs a customer referenced by ID; an email typed at
/// checkout can resolve a customer but never vouches for the payer.
fn is_whitelisted(
    customer: Option<&Customer>,
    snapshot: &TransactionSnapshot,
    vip_customers: &[String],
) -> bool {
    let Some(customer) = customer.filter(|c| snapshot.customer_id == Some(c.id)) else {
        return false;
    };
    if customer.whitelisted {
        return true;
    }

    let email = customer.email.trim().to_lowercase();
    !email.is_empty() && vip_customers.iter().any(|vip| vip.trim().eq_ignore_ascii_case(&email))
}

/// Copy of `snapshot` with the request's IP, device and user agent recorded
/// in its metadata. Existing values are overwritten by caller-supplied ones.
pub fn enrich(
    snapshot: &TransactionSnapshot,
    context: &EvaluationContext,
    user_agent: Option<&str>,
) -> TransactionSnapshot {
    let mut enriched = snapshot.clone();

    if let Some(ip) = &context.ip_address {
        enriched.metadata.ip_address = Some(ip.clone());
    }
    if let Some(device) = &context.device_fingerprint {
        enriched.metadata.device_fingerprint = Some(device.clone());
    }
    if let Some(agent) = user_agent {
        enriched.metadata.user_agent = Some(agent.to_string());
    }

    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use scoring_core::memory::InMemoryDirectory;
    use scoring_core::Merchant;

    fn setup() -> (Arc<InMemoryDirectory>, Merchant) {
        let directory = Arc::new(InMemoryDirectory::new());
        let mut merchant = Merchant::new("Shop");
        merchant.settings.vip_customers = vec!["VIP@Example.com".to_string()];
        directory.add_merchant(merchant.clone());
        (directory, merchant)
    }

    #[tokio::test]
    async fn test_customer_resolved_by_email() {
        let (directory, merchant) = setup();
        let customer = Customer::new("jane@example.com");
        directory.add_customer(customer.clone());

        let tx = TransactionSnapshot::new(merchant.id, dec!(10), "USD").with_email("Jane@Example.com ");
        let ctx = ContextBuilder::new(directory)
            .build(&tx, Some("10.0.0.1".to_string()), None)
            .await
            .unwrap();

        assert_eq!(ctx.customer.map(|c| c.id), Some(customer.id));
        assert_eq!(ctx.ip_address.as_deref(), Some("10.0.0.1"));
        assert!(!ctx.whitelisted);
    }

    #[tokio::test]
    async fn test_missing_merchant_is_unresolved() {
        let (directory, _) = setup();
        let tx = TransactionSnapshot::new(uuid::Uuid::new_v4(), dec!(10), "USD");
        let result = ContextBuilder::new(directory).build(&tx, None, None).await;
        assert!(matches!(result, Err(Error::UnresolvedIdentity(_))));
    }

    #[tokio::test]
    async fn test_vip_customer_is_whitelisted() {
        let (directory, merchant) = setup();
        let customer = Customer::new("vip@example.com");
        directory.add_customer(customer.clone());

        let tx = TransactionSnapshot::new(merchant.id, dec!(10), "USD").with_customer(customer.id);
        let ctx = ContextBuilder::new(directory).build(&tx, None, None).await.unwrap();
        assert!(ctx.whitelisted);
    }

    #[tokio::test]
    async fn test_guest_typing_vip_email_is_not_whitelisted() {
        let (directory, merchant) = setup();
        let tx = TransactionSnapshot::new(merchant.id, dec!(10), "USD").with_email("vip@example.com");
        let ctx = ContextBuilder::new(directory).build(&tx, None, None).await.unwrap();
        assert!(ctx.customer.is_none());
        assert!(!ctx.whitelisted);
    }

    #[tokio::test]
    async fn test_customer_found_by_email_is_not_whitelisted() {
        let (directory, merchant) = setup();
        let mut customer = Customer::new("vip@example.com");
        customer.whitelisted = true;
        directory.add_customer(customer.clone());

        let tx = TransactionSnapshot::new(merchant.id, dec!(10), "USD").with_email("VIP@example.com");
        let ctx = ContextBuilder::new(directory).build(&tx, None, None).await.unwrap();
        assert_eq!(ctx.customer.map(|c| c.id), Some(customer.id));
        assert!(!ctx.whitelisted);
    }

    #[tokio::test]
    async fn test_whitelisted_customer_flag() {
        let (directory, merchant) = setup();
        let mut customer = Customer::new("trusted@example.com");
        customer.whitelisted = true;
        directory.add_customer(customer.clone());

        let tx = TransactionSnapshot::new(merchant.id, dec!(10), "USD").with_customer(customer.id);
        let ctx = ContextBuilder::new(directory).build(&tx, None, None).await.unwrap();
        assert!(ctx.whitelisted);
    }

    #[test]
    fn test_enrich_records_request_fields() {
        let merchant = Merchant::new("Shop");
        let tx = TransactionSnapshot::new(merchant.id, dec!(10), "USD");
        let ctx = EvaluationContext::new(merchant).with_ip("41.58.1.1").with_device("dev-1");

        let enriched = enrich(&tx, &ctx, Some("Mozilla/5.0"));
        assert_eq!(enriched.metadata.ip_address.as_deref(), Some("41.58.1.1"));
        assert_eq!(enriched.metadata.device_fingerprint.as_deref(), Some("dev-1"));
        assert_eq!(enriched.metadata.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(enriched.id, tx.id);
        assert!(tx.metadata.ip_address.is_none());
    }
}
