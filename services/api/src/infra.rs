use async_trait::async_trait;
use credential_intake::workflows::application::notifications::{
    LogMailer, Mailer, OutboundEmail, TransportError,
};
use credential_intake::workflows::application::payment::{
    PaymentIntent, PaymentProcessor, ProcessorError,
};
use credential_intake::workflows::application::{PaymentRecord, PaymentStatus};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Logs every message through [`LogMailer`] and keeps a copy for the demo to inspect.
#[derive(Default, Clone)]
pub(crate) struct CapturingMailer {
    outbox: Arc<Mutex<Vec<OutboundEmail>>>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), TransportError> {
        LogMailer.send(email.clone()).await?;
        self.outbox.lock().expect("outbox mutex poisoned").push(email);
        Ok(())
    }
}

impl CapturingMailer {
    pub(crate) fn messages(&self) -> Vec<OutboundEmail> {
        self.outbox.lock().expect("outbox mutex poisoned").clone()
    }

    pub(crate) fn last_to(&self, address: &str) -> Option<OutboundEmail> {
        self.messages()
            .into_iter()
            .rev()
            .find(|email| email.to == address)
    }
}

/// Processor that keeps intents in memory until the demo settles them.
#[derive(Default, Clone)]
pub(crate) struct DemoProcessor {
    payments: Arc<Mutex<HashMap<String, PaymentRecord>>>,
    sequence: Arc<AtomicUsize>,
}

impl DemoProcessor {
    pub(crate) fn settle(&self, reference: &str, status: &str) {
        let mut guard = self.payments.lock().expect("payment mutex poisoned");
        if let Some(record) = guard.get_mut(reference) {
            record.status = PaymentStatus::new(status);
        }
    }

    /// Intent reference behind a client token issued by this processor.
    pub(crate) fn reference_for(&self, token: &str) -> Option<String> {
        token
            .strip_suffix(DEMO_SECRET_SUFFIX)
            .filter(|reference| {
                self.payments
                    .lock()
                    .expect("payment mutex poisoned")
                    .contains_key(*reference)
            })
            .map(str::to_string)
    }
}

const DEMO_SECRET_SUFFIX: &str = "_secret_demo";

#[async_trait]
impl PaymentProcessor for DemoProcessor {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ProcessorError> {
        let index = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("pi_demo_{index:04}");
        let record = PaymentRecord {
            reference: reference.clone(),
            status: PaymentStatus::new(PaymentStatus::REQUIRES_PAYMENT_METHOD),
            amount: amount_minor,
            currency: currency.to_string(),
        };
        self.payments
            .lock()
            .expect("payment mutex poisoned")
            .insert(reference.clone(), record);

        Ok(PaymentIntent {
            client_secret: format!("{reference}{DEMO_SECRET_SUFFIX}"),
            reference,
            amount: amount_minor,
            currency: currency.to_string(),
        })
    }

    async fn retrieve(&self, reference: &str) -> Result<PaymentRecord, ProcessorError> {
        self.payments
            .lock()
            .expect("payment mutex poisoned")
            .get(reference)
            .cloned()
            .ok_or_else(|| ProcessorError::Rejected {
                status: 404,
                message: format!("No such payment_intent: '{reference}'"),
            })
    }
}

/// First run of exactly six digits in a message body.
pub(crate) fn verification_code(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|run| run.len() == 6)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_processor_maps_tokens_back_to_references() {
        let processor = DemoProcessor::default();
        let intent = processor.create_intent(14900, "usd").await.expect("intent");

        assert_eq!(intent.reference, "pi_demo_0001");
        assert_eq!(
            processor.reference_for(&intent.client_secret).as_deref(),
            Some("pi_demo_0001")
        );
        assert_eq!(processor.reference_for("pi_other_secret_demo"), None);

        processor.settle("pi_demo_0001", PaymentStatus::SUCCEEDED);
        let record = processor.retrieve("pi_demo_0001").await.expect("record");
        assert!(record.status.is_succeeded());
    }

    #[test]
    fn extracts_six_digit_codes_only() {
        assert_eq!(
            verification_code("Your code is 048213. It expires in 10 minutes.").as_deref(),
            Some("048213")
        );
        assert_eq!(verification_code("© 2026, ref 12345"), None);
    }
}
