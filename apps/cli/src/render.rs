use client_core::{SessionEvent, SessionView};
use shared::domain::{SessionPhase, Tallies};

fn count(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |n| n.to_string())
}

pub fn render_tallies(tallies: &Tallies) -> String {
    format!(
        "Total votes: {} | Party A: {} | Party B: {}",
        count(tallies.total),
        count(tallies.for_a),
        count(tallies.for_b)
    )
}

pub fn render_view(view: &SessionView) -> String {
    let mut lines = Vec::new();

    match view.phase {
        SessionPhase::NoWallet => {
            lines.push(client_core::INSTALL_WALLET_NOTICE.to_string());
        }
        SessionPhase::WalletDetected => {
            lines.push("Wallet detected. Run `voting-cli connect` to authenticate.".to_string());
        }
        SessionPhase::Authenticated | SessionPhase::ContractBound => {
            if let Some(account) = &view.account {
                lines.push(format!("Account: {account}"));
            }
            if view.phase == SessionPhase::Authenticated {
                lines.push("Contract not bound yet.".to_string());
            }
            if view.tallies != Tallies::default() {
                lines.push(render_tallies(&view.tallies));
            }
            if let Some(winner) = &view.winning_party {
                lines.push(format!("Winning Party: {winner}"));
            }
            if view.submission_pending {
                lines.push("A vote submission is awaiting confirmation.".to_string());
            }
        }
    }

    if let Some(error) = &view.last_error {
        lines.push(format!(
            "Last error ({:?} during {:?}): {}",
            error.kind, error.context, error.message
        ));
    }

    lines.join("\n")
}

// State changes are rendered from the view instead.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StateChanged(_) => None,
        SessionEvent::Notice(text) => Some(text.clone()),
        SessionEvent::Warning(text) => Some(format!("warning: {text}")),
        SessionEvent::Error(error) => Some(format!("error: {}", error.message)),
        SessionEvent::TransactionSubmitted { field, hash } => Some(format!(
            "Submitted {} transaction {hash}; waiting for confirmation...",
            field.label()
        )),
        SessionEvent::TransactionConfirmed { field, hash } => {
            Some(format!("Confirmed {} transaction {hash}", field.label()))
        }
    }
}
