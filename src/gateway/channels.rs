use super::{
    barcode, AppPayment, BarcodeOutcome, BarcodePayment, FormPayment, GatewayEngine,
    NotifyVerification, ScanPayment, UrlPayment,
};
use crate::errors::{GatewayError, Result};
use crate::notify::NotifyOutcome;
use crate::params::ParameterBag;
use crate::types::OrderModel;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

impl FormPayment for GatewayEngine {
    fn build_form_payment(&self, order: &OrderModel) -> Result<String> {
        let params = self.init_form_payment(order)?;
        Ok(params.to_form_html(&self.config.gateway_url))
    }
}

impl UrlPayment for GatewayEngine {
    fn build_url_payment(&self, order: &OrderModel) -> Result<String> {
        let params = self.init_url_payment(order)?;
        Ok(format!(
            "{}?{}",
            self.config.gateway_url,
            params.to_url_encoded_query_string()
        ))
    }
}

impl AppPayment for GatewayEngine {
    fn build_app_payment(&self, order: &OrderModel) -> Result<String> {
        Ok(self.init_app_payment(order)?.to_url_encoded_query_string())
    }
}

#[async_trait]
impl ScanPayment for GatewayEngine {
    async fn build_scan_payment(&self, order: &OrderModel) -> Result<String> {
        let notify = self.pre_create(order).await?;
        if notify.qr_code.is_empty() {
            return Err(GatewayError::MissingKey("qr_code".to_string()));
        }
        info!(out_trade_no = %order.out_trade_no, "scan order created");
        Ok(notify.qr_code)
    }
}

#[async_trait]
impl BarcodePayment for GatewayEngine {
    async fn build_barcode_payment(
        &self,
        order: &OrderModel,
        cancel: CancellationToken,
    ) -> Result<BarcodeOutcome> {
        barcode::run(self, order, &cancel).await
    }
}

#[async_trait]
impl NotifyVerification for GatewayEngine {
    async fn verify_notification(&self, params: &ParameterBag) -> NotifyOutcome {
        self.notify_validator().validate(params).await
    }
}
