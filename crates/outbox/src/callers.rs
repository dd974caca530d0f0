//! Dealership save operations wired to their outboxes.

use std::sync::Arc;

use motodesk_core::DomainResult;
use motodesk_sales::{MinorSale, Quotation};

use crate::routing::DestinationRegistry;
use crate::save_flow::{OutboxPayload, SaveFlow};
use crate::store::PersistentStore;
use crate::submit::Submitter;
use crate::types::JobType;

impl OutboxPayload for Quotation {
    const JOB_TYPE: JobType = JobType::QuotationSave;

    fn validate(&self) -> DomainResult<()> {
        Quotation::validate(self)
    }
}

impl OutboxPayload for MinorSale {
    const JOB_TYPE: JobType = JobType::MinorSaleSave;

    fn validate(&self) -> DomainResult<()> {
        MinorSale::validate(self)
    }
}

pub type QuotationSaves = SaveFlow<Quotation>;
pub type MinorSaleSaves = SaveFlow<MinorSale>;

/// Both save flows over one store, registry and submitter.
#[derive(Debug, Clone)]
pub struct SaveFlows {
    pub quotations: QuotationSaves,
    pub minor_sales: MinorSaleSaves,
}

impl SaveFlows {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        registry: Arc<DestinationRegistry>,
        submitter: Arc<dyn Submitter>,
    ) -> Self {
        Self {
            quotations: SaveFlow::new(Arc::clone(&store), Arc::clone(&registry), Arc::clone(&submitter)),
            minor_sales: SaveFlow::new(store, registry, submitter),
        }
    }

    pub fn with_runtime(self, handle: tokio::runtime::Handle) -> Self {
        Self {
            quotations: self.quotations.with_runtime(handle.clone()),
            minor_sales: self.minor_sales.with_runtime(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Delivery;
    use crate::coordinator::tests::{ScriptedSubmitter, configured_registry};
    use crate::routing::UnconfiguredPolicy;
    use crate::store::InMemoryStore;
    use crate::submit::SubmitOutcome;
    use chrono::Utc;
    use motodesk_core::MobileNumber;
    use motodesk_sales::{MinorSaleItem, PaymentMode};
    use std::time::Duration;

    fn quotation() -> Quotation {
        Quotation {
            serial_no: "Q-BYD-AB12CD".parse().unwrap(),
            branch: "Byadarahalli".to_string(),
            customer_name: "Ravi Kumar".to_string(),
            mobile: MobileNumber::parse("9876543210").unwrap(),
            model: "Jupiter 125".to_string(),
            variant: None,
            colour: Some("Titanium Grey".to_string()),
            ex_showroom_price: 89_000,
            on_road_price: 104_500,
            executive: "Anitha".to_string(),
            remarks: None,
            created_at: Utc::now(),
        }
    }

    fn minor_sale() -> MinorSale {
        MinorSale {
            bill_no: "MS-BYD-0042".to_string(),
            branch: "Byadarahalli".to_string(),
            customer_name: None,
            mobile: None,
            items: vec![MinorSaleItem {
                part_no: "N9160230".to_string(),
                description: "Brake shoe set".to_string(),
                quantity: 1,
                unit_price: 450,
            }],
            payment_mode: PaymentMode::Cash,
            discount: 0,
            created_at: Utc::now(),
        }
    }

    fn flows(submitter: Arc<ScriptedSubmitter>, registry: Arc<DestinationRegistry>) -> SaveFlows {
        SaveFlows::new(InMemoryStore::arc(), registry, submitter)
    }

    async fn wait_until_drained(queue: &crate::queue::OutboxQueue) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !queue.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("outbox drained in time");
    }

    #[tokio::test]
    async fn staged_quotation_is_durable_before_any_attempt() {
        let flows = flows(ScriptedSubmitter::failing(&[]), configured_registry());
        let staged = flows.quotations.stage(&quotation()).unwrap();

        let entries = flows.quotations.queue().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(&entries[0].id, staged.id());
        assert_eq!(entries[0].job.job_type, JobType::QuotationSave);
        assert_eq!(entries[0].job.data["serialNo"], "Q-BYD-AB12CD");

        let delivery = flows.quotations.confirm(staged).await.unwrap();
        assert_eq!(delivery, Delivery::Attempted(SubmitOutcome::Delivered));
        assert!(flows.quotations.queue().is_empty());
    }

    #[tokio::test]
    async fn invalid_payload_never_enters_the_outbox() {
        let flows = flows(ScriptedSubmitter::failing(&[]), configured_registry());
        let bad = Quotation {
            customer_name: String::new(),
            ..quotation()
        };

        assert!(flows.quotations.stage(&bad).unwrap_err().is_validation());
        assert!(flows.quotations.queue().is_empty());
    }

    #[tokio::test]
    async fn failed_confirm_leaves_the_job_queued() {
        let submitter = ScriptedSubmitter::failing(&[]);
        submitter.fail.lock().unwrap().push(u64::MAX);
        let flows = flows(submitter, configured_registry());

        let staged = flows.minor_sales.stage(&minor_sale()).unwrap();
        let delivery = flows.minor_sales.confirm(staged.clone()).await.unwrap();

        assert!(!delivery.is_settled());
        assert_eq!(flows.minor_sales.queue().entries(), vec![staged.entry]);
    }

    #[tokio::test]
    async fn unconfigured_minor_sale_counts_as_saved() {
        let flows = flows(
            ScriptedSubmitter::failing(&[]),
            Arc::new(DestinationRegistry::defaults(None, None)),
        );

        let staged = flows.minor_sales.stage(&minor_sale()).unwrap();
        let delivery = flows.minor_sales.confirm(staged).await.unwrap();
        assert_eq!(delivery, Delivery::Unconfigured(UnconfiguredPolicy::TreatAsDelivered));
        assert!(flows.minor_sales.queue().is_empty());

        let staged = flows.quotations.stage(&quotation()).unwrap();
        let delivery = flows.quotations.confirm(staged).await.unwrap();
        assert_eq!(delivery, Delivery::Unconfigured(UnconfiguredPolicy::Hold));
        assert_eq!(flows.quotations.queue().len(), 1);
    }

    #[tokio::test]
    async fn save_returns_before_delivery() {
        let flows = flows(ScriptedSubmitter::failing(&[]), configured_registry());
        let id = flows.quotations.save(&quotation()).unwrap();
        assert_eq!(flows.quotations.queue().entries()[0].id, id);
    }

    #[tokio::test]
    async fn saved_job_is_delivered_in_the_background() {
        let submitter = ScriptedSubmitter::failing(&[]);
        let flows = flows(submitter.clone(), configured_registry());

        let id = flows.minor_sales.save(&minor_sale()).unwrap();
        wait_until_drained(flows.minor_sales.queue()).await;

        let seen = submitter.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["outboxId"], id.as_str());
        assert_eq!(seen[0]["billNo"], "MS-BYD-0042");
    }

    #[test]
    fn save_outside_a_runtime_only_queues() {
        let submitter = ScriptedSubmitter::failing(&[]);
        let flows = flows(submitter.clone(), configured_registry());

        let id = flows.quotations.save(&quotation()).unwrap();

        assert_eq!(flows.quotations.queue().entries()[0].id, id);
        assert!(submitter.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn save_from_a_plain_thread_uses_the_given_runtime() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let submitter = ScriptedSubmitter::failing(&[]);
        let flows = flows(submitter.clone(), configured_registry()).with_runtime(rt.handle().clone());

        flows.quotations.save(&quotation()).unwrap();

        rt.block_on(wait_until_drained(flows.quotations.queue()));
        assert_eq!(submitter.seen.lock().unwrap().len(), 1);
    }
}
