use chrono::Utc;
use log::*;
use mercadopago_tools::{MercadoPagoApi, MercadoPagoApiError, MercadoPagoConfig, Payment};
use rread_common::Money;
use rread_engine::{
    db_types::PaymentId,
    GatewayError,
    GatewayPayment,
    GatewayStatus,
    PaymentGateway,
};

/// The Mercado Pago REST client, seen from the fulfilment engine as a [`PaymentGateway`].
#[derive(Clone)]
pub struct MercadoPagoGateway {
    api: MercadoPagoApi,
}

impl MercadoPagoGateway {
    pub fn new(config: MercadoPagoConfig) -> Result<Self, MercadoPagoApiError> {
        let api = MercadoPagoApi::new(config)?;
        Ok(Self { api })
    }
}

impl PaymentGateway for MercadoPagoGateway {
    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<GatewayPayment, GatewayError> {
        let payment = self.api.get_payment(payment_id.as_str()).await.map_err(|e| {
            debug!("💳️ Mercado Pago lookup for payment {payment_id} failed. {e}");
            gateway_error(e)
        })?;
        Ok(gateway_payment(payment))
    }
}

fn gateway_error(e: MercadoPagoApiError) -> GatewayError {
    match e {
        MercadoPagoApiError::QueryError { status, message } => GatewayError::Rejected { status, message },
        MercadoPagoApiError::JsonError(s) | MercadoPagoApiError::RestResponseError(s) => {
            GatewayError::InvalidResponse(s)
        },
        MercadoPagoApiError::RestRequestError(s) | MercadoPagoApiError::Initialization(s) => {
            GatewayError::Unreachable(s)
        },
    }
}

pub fn gateway_payment(payment: Payment) -> GatewayPayment {
    let amount = payment.transaction_amount.and_then(|a| {
        Money::try_from(a).map_err(|e| warn!("💳️ Ignoring the amount of payment {}. {e}", payment.id)).ok()
    });
    let mut result = GatewayPayment::new(PaymentId::from(payment.id), GatewayStatus::from(payment.status.as_str()));
    result.status_detail = payment.status_detail;
    result.external_reference = payment.external_reference;
    result.amount = amount;
    result.approved_at = payment.date_approved.map(|d| d.with_timezone(&Utc));
    result
}
