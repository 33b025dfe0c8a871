use crate::application::worker::BankHandle;
use crate::error::BankError;
use crate::interfaces::wire::protocol::{Action, Outcome, Request, Response};
use tracing::{debug, error, warn};

/// Routes decoded requests to the bank and turns every outcome, including
/// faults, into a [`Response`].
#[derive(Clone)]
pub struct Dispatcher {
    bank: BankHandle,
}

impl Dispatcher {
    pub fn new(bank: BankHandle) -> Self {
        Self { bank }
    }

    pub fn bank(&self) -> &BankHandle {
        &self.bank
    }

    /// Decodes `frame` and executes it.
    pub async fn dispatch(&self, frame: &[u8]) -> Response {
        match Request::decode(frame) {
            Ok(request) => self.route(request).await,
            Err(err) => {
                warn!(error = %err, "rejected undecodable request");
                Response::from(&err)
            }
        }
    }

    pub async fn route(&self, request: Request) -> Response {
        let action = request.action();
        debug!(%action, "routing request");

        let result = match request {
            Request::RegisterUser(registration) => self
                .bank
                .register_user(registration)
                .await
                .map(|user| Outcome::UserRegistered {
                    uid: user.uid,
                    mmid: user.mmid,
                }),
            Request::RegisterMerchant(registration) => self
                .bank
                .register_merchant(registration)
                .await
                .map(|merchant_id| Outcome::MerchantRegistered { merchant_id }),
            Request::ValidateTransaction(settlement) => {
                self.bank
                    .settle(settlement)
                    .await
                    .map(|receipt| Outcome::Settled {
                        message: format!("Transaction of {} successful", receipt.amount),
                        remaining_balance: receipt.remaining_balance,
                    })
            }
            Request::GetBlockchain => self
                .bank
                .blockchain()
                .await
                .map(|chain| Outcome::Chain { chain }),
        };

        match result {
            Ok(outcome) => Response::Success(outcome),
            Err(err) => {
                log_failure(action, &err);
                Response::from(&err)
            }
        }
    }
}

fn log_failure(action: Action, err: &BankError) {
    if err.is_internal() {
        error!(%action, error = %err, "request failed");
    } else {
        warn!(%action, error = %err, "request rejected");
    }
}
