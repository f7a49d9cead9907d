//! Event dispatcher: applies one validated event to the ledger.
//!
//! Every handler runs inside the caller's unit of work, so either all of
//! an event's rows (journal, lines, movements, order) become visible
//! together on commit, or none do. The dispatcher re-checks the period
//! guard and the idempotency stamp itself; it may be invoked without the
//! receiver in front of it.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

use anchorledger_accounting::{
    check_period, entry_types, AccountRole, JournalLine, JournalPlan, JournalStatus,
    NewJournalEntry, PlannedLine,
};
use anchorledger_core::{round2, Clock, EntryNumberGenerator, LedgerError};
use anchorledger_events::{AnchorEvent, EventType};
use anchorledger_inventory::{MovementType, StockMovement};
use anchorledger_sales::{NewOrderItem, NewSalesOrder};

use crate::store::{LedgerUow, StoreError};

/// Dispatcher failure: either a reason-coded business rejection or an
/// infrastructure fault from the store.
#[derive(Debug, Error)]
pub enum EventError {
    #[error(transparent)]
    Domain(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Apply one validated event to the ledger.
///
/// Returns `Ok(())` both on first application and when the event's
/// `source_event_id` is already stamped somewhere (idempotent replay).
#[instrument(
    skip_all,
    fields(event_id = %event.event_id, event_type = %event.event_type)
)]
pub async fn apply_event<U: LedgerUow>(
    uow: &mut U,
    entry_numbers: &dyn EntryNumberGenerator,
    clock: &dyn Clock,
    event: &AnchorEvent,
) -> Result<(), EventError> {
    let period = uow.period_for_date(event.event_date()).await?;
    check_period(period.as_ref(), event.event_type.impact())?;

    if uow.source_event_applied(event.event_id).await? {
        info!("event already applied, skipping");
        return Ok(());
    }

    match event.event_type {
        EventType::OrderConfirmed => order_confirmed(uow, event).await,
        EventType::GoodsShipped => goods_shipped(uow, entry_numbers, clock, event).await,
        EventType::GoodsDelivered => goods_delivered(uow, entry_numbers, clock, event).await,
        EventType::PaymentReceived => payment_received(uow, entry_numbers, clock, event).await,
        // Informational only. Sequencing is still enforced by the receiver.
        EventType::ReturnRequested => Ok(()),
        EventType::GoodsReturned => goods_returned(uow, entry_numbers, clock, event).await,
        EventType::RefundSettled => refund_settled(uow, entry_numbers, clock, event).await,
    }
}

async fn order_confirmed<U: LedgerUow>(
    uow: &mut U,
    event: &AnchorEvent,
) -> Result<(), EventError> {
    let order_number = event.order_id()?;
    let mut items = Vec::new();
    for line in event.order_lines()? {
        let product = uow
            .product_by_sku(&line.sku)
            .await?
            .ok_or(LedgerError::MissingProduct {
                sku: line.sku.clone(),
            })?;
        items.push(NewOrderItem {
            product_id: product.id,
            sku: line.sku,
            quantity: line.qty,
            unit_price: line.unit_price,
        });
    }

    let order = NewSalesOrder {
        order_number: order_number.clone(),
        customer_id: event.customer_id().unwrap_or_default(),
        order_date: event.order_date(),
        items,
        source_event_id: event.event_id,
    };

    match uow.insert_sales_order(&order).await {
        Ok(_) => {
            info!(order_number = %order_number, "sales order created");
            Ok(())
        }
        Err(StoreError::DuplicateSource(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn goods_shipped<U: LedgerUow>(
    uow: &mut U,
    entry_numbers: &dyn EntryNumberGenerator,
    clock: &dyn Clock,
    event: &AnchorEvent,
) -> Result<(), EventError> {
    let order_number = event.order_id()?;
    let warehouse_id = event.warehouse_id()?;

    let mut total_value = 0.0;
    let mut movements = Vec::new();
    for item in event.items()? {
        let product = uow
            .product_by_sku(&item.sku)
            .await?
            .ok_or(LedgerError::MissingProduct {
                sku: item.sku.clone(),
            })?;
        total_value += item.qty * product.cost_price;
        movements.push(StockMovement::new(
            product.id,
            warehouse_id,
            MovementType::Ship,
            item.qty,
            product.cost_price,
            Some(order_number.clone()),
            None,
            event.event_time.with_timezone(&Utc),
            event.event_id,
        ));
    }

    let plan = JournalPlan::balanced(
        entry_types::INVENTORY_TRANSFER,
        format!("Goods shipped for order {order_number}"),
        Some(order_number),
        vec![
            PlannedLine::debit(AccountRole::InventoryInTransit, total_value),
            PlannedLine::credit(AccountRole::Inventory, total_value),
        ],
    )?;

    if post_journal(uow, entry_numbers, clock, event, plan).await?.is_none() {
        return Ok(());
    }
    for movement in &movements {
        uow.insert_stock_movement(movement).await?;
    }
    Ok(())
}

async fn goods_delivered<U: LedgerUow>(
    uow: &mut U,
    entry_numbers: &dyn EntryNumberGenerator,
    clock: &dyn Clock,
    event: &AnchorEvent,
) -> Result<(), EventError> {
    let order_number = event.order_id()?;
    let (revenue, cogs) = order_valuation(uow, event, &order_number).await?;

    let plan = JournalPlan::balanced(
        entry_types::REVENUE_RECOGNITION,
        format!("Goods delivered for order {order_number}"),
        Some(order_number),
        vec![
            PlannedLine::debit(AccountRole::AccountsReceivable, revenue),
            PlannedLine::credit(AccountRole::Revenue, revenue),
            PlannedLine::debit(AccountRole::Cogs, cogs),
            PlannedLine::credit(AccountRole::InventoryInTransit, cogs),
        ],
    )?;

    post_journal(uow, entry_numbers, clock, event, plan).await?;
    Ok(())
}

async fn payment_received<U: LedgerUow>(
    uow: &mut U,
    entry_numbers: &dyn EntryNumberGenerator,
    clock: &dyn Clock,
    event: &AnchorEvent,
) -> Result<(), EventError> {
    let order_number = event.order_id()?;
    let amount = event.amount()?;

    let plan = JournalPlan::balanced(
        entry_types::RECEIPT,
        format!("Payment received for order {order_number}"),
        Some(order_number),
        vec![
            PlannedLine::debit(AccountRole::Cash, amount),
            PlannedLine::credit(AccountRole::AccountsReceivable, amount),
        ],
    )?;

    post_journal(uow, entry_numbers, clock, event, plan).await?;
    Ok(())
}

async fn goods_returned<U: LedgerUow>(
    uow: &mut U,
    entry_numbers: &dyn EntryNumberGenerator,
    clock: &dyn Clock,
    event: &AnchorEvent,
) -> Result<(), EventError> {
    let order_number = event.order_id()?;
    let warehouse_id = event.warehouse_id()?;
    let (return_amount, cost_reversal) = order_valuation(uow, event, &order_number).await?;

    let mut movements = Vec::new();
    for item in event.items()? {
        let product = uow
            .product_by_sku(&item.sku)
            .await?
            .ok_or(LedgerError::MissingProduct {
                sku: item.sku.clone(),
            })?;
        movements.push(StockMovement::new(
            product.id,
            warehouse_id,
            MovementType::Return,
            item.qty,
            product.cost_price,
            Some(order_number.clone()),
            None,
            event.event_time.with_timezone(&Utc),
            event.event_id,
        ));
    }

    let plan = JournalPlan::balanced(
        entry_types::SALES_RETURN,
        format!("Goods returned for order {order_number}"),
        Some(order_number),
        vec![
            PlannedLine::debit(AccountRole::SalesReturns, return_amount),
            PlannedLine::credit(AccountRole::AccountsReceivable, return_amount),
            PlannedLine::debit(AccountRole::Inventory, cost_reversal),
            PlannedLine::credit(AccountRole::Cogs, cost_reversal),
        ],
    )?;

    if post_journal(uow, entry_numbers, clock, event, plan).await?.is_none() {
        return Ok(());
    }
    for movement in &movements {
        uow.insert_stock_movement(movement).await?;
    }
    Ok(())
}

async fn refund_settled<U: LedgerUow>(
    uow: &mut U,
    entry_numbers: &dyn EntryNumberGenerator,
    clock: &dyn Clock,
    event: &AnchorEvent,
) -> Result<(), EventError> {
    let order_number = event.order_id()?;
    let amount = event.amount()?;

    let plan = JournalPlan::balanced(
        entry_types::REFUND,
        format!("Refund settled for order {order_number}"),
        Some(order_number),
        vec![
            PlannedLine::debit(AccountRole::SalesReturnsAllowance, amount),
            PlannedLine::credit(AccountRole::Cash, amount),
        ],
    )?;

    post_journal(uow, entry_numbers, clock, event, plan).await?;
    Ok(())
}

/// Value the event's items against the originating order: revenue at the
/// agreed unit price per SKU, cost at the product's current cost price.
async fn order_valuation<U: LedgerUow>(
    uow: &mut U,
    event: &AnchorEvent,
    order_number: &str,
) -> Result<(f64, f64), EventError> {
    let prices = uow.order_line_prices(order_number).await?;
    if prices.is_empty() {
        return Err(LedgerError::MissingOrder {
            order_number: order_number.to_string(),
        }
        .into());
    }

    let mut revenue = 0.0;
    let mut cost = 0.0;
    for item in event.items()? {
        let line = prices.get(&item.sku).ok_or(LedgerError::MissingOrderLine {
            sku: item.sku.clone(),
        })?;
        let product = uow
            .product_by_sku(&item.sku)
            .await?
            .ok_or(LedgerError::MissingProduct {
                sku: item.sku.clone(),
            })?;
        revenue += item.qty * line.unit_price;
        cost += item.qty * product.cost_price;
    }
    Ok((revenue, cost))
}

/// Resolve the plan's logical roles to account ids and write the entry as
/// Posted. Returns `None` when the store reports the event's rows already
/// exist (idempotent replay under a racing delivery).
async fn post_journal<U: LedgerUow>(
    uow: &mut U,
    entry_numbers: &dyn EntryNumberGenerator,
    clock: &dyn Clock,
    event: &AnchorEvent,
    plan: JournalPlan,
) -> Result<Option<i64>, EventError> {
    let mut lines = Vec::with_capacity(plan.lines().len());
    for (index, planned) in plan.lines().iter().enumerate() {
        let account_id = uow.ensure_account(&planned.role.spec()).await?;
        lines.push(JournalLine {
            line_number: index as u32 + 1,
            account_id,
            description: planned
                .description
                .clone()
                .unwrap_or_else(|| plan.description().to_string()),
            debit: round2(planned.debit),
            credit: round2(planned.credit),
            source_event_id: event.event_id,
        });
    }

    let entry = NewJournalEntry {
        entry_number: entry_numbers.next_entry_number(event.event_id),
        entry_date: event.event_date(),
        entry_type: plan.entry_type().to_string(),
        reference: plan.reference().map(str::to_string),
        description: plan.description().to_string(),
        status: JournalStatus::Posted,
        total_debit: round2(plan.total_debit()),
        total_credit: round2(plan.total_credit()),
        source_event_id: event.event_id,
        posted_at: Some(clock.now()),
        lines,
    };

    match uow.insert_journal(&entry).await {
        Ok(id) => {
            info!(entry_number = %entry.entry_number, "journal posted");
            Ok(Some(id))
        }
        Err(StoreError::DuplicateSource(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Convenience for tests and callers that do not need structured errors.
pub fn reason_code_of(err: &EventError) -> Option<anchorledger_core::ReasonCode> {
    match err {
        EventError::Domain(e) => Some(e.reason_code()),
        EventError::Store(StoreError::DuplicateSource(_)) => {
            Some(anchorledger_core::ReasonCode::DuplicateEvent)
        }
        EventError::Store(_) => None,
    }
}
