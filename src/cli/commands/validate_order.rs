//! Validate order command implementation.

use anyhow::Result;
use riskbook_config::AppConfig;
use riskbook_core::OrderProposal;
use riskbook_engine::Engine;
use riskbook_gateway::PaperGateway;
use std::sync::Arc;

use crate::cli::ValidateOrderArgs;

pub async fn run(args: ValidateOrderArgs, config: &AppConfig) -> Result<()> {
    let engine = Engine::new(config, Arc::new(PaperGateway::new()));

    let mut proposal =
        OrderProposal::limit(&args.symbol, args.side.order_side(), args.quantity, args.price);
    if let Some(stop) = args.stop_loss {
        proposal = proposal.with_stop_loss(stop);
    }
    if let Some(target) = args.take_profit {
        proposal = proposal.with_take_profit(target);
    }

    let result = engine.validate_order(&proposal, args.balance);
    if result.allowed {
        println!("Order allowed");
        if let Some(size) = result.suggested_position_size {
            println!("Suggested quantity: {}", size);
        }
    } else {
        println!("Order rejected");
        if let Some(check) = result.failed_check {
            println!("Check: {:?}", check);
        }
        for reason in &result.reasons {
            println!("  - {}", reason);
        }
    }

    Ok(())
}
