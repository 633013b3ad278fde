use std::collections::HashSet;

use uuid::Uuid;

use crate::decimal::Decimal;
use crate::errors::AppError;
use crate::models::{CostBasisMethod, TaxLot};

/// Lot consumption order for a single SELL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LotSelection {
    Fifo,
    Lifo,
    /// Caller-named lots, consumed in the order given.
    SpecificLot(Vec<Uuid>),
}

impl LotSelection {
    /// Resolves the portfolio's configured method and the caller's lot list
    /// into a selection. `lot_ids` is mandatory for SPECIFIC_LOT and refused
    /// for the other methods.
    pub fn for_method(
        method: CostBasisMethod,
        lot_ids: Option<Vec<Uuid>>,
    ) -> Result<Self, AppError> {
        match (method, lot_ids) {
            (CostBasisMethod::Fifo, None) => Ok(LotSelection::Fifo),
            (CostBasisMethod::Lifo, None) => Ok(LotSelection::Lifo),
            (CostBasisMethod::SpecificLot, Some(ids)) if !ids.is_empty() => {
                Ok(LotSelection::SpecificLot(ids))
            }
            (CostBasisMethod::SpecificLot, _) => Err(AppError::transaction_field(
                "lot_ids",
                "SPECIFIC_LOT portfolios must name the lots to sell",
            )),
            (_, Some(_)) => Err(AppError::transaction_field(
                "lot_ids",
                "lot selection is only accepted for SPECIFIC_LOT portfolios",
            )),
        }
    }
}

/// One step of a disposal plan: consume `quantity` shares from `lot_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotTake {
    pub lot_id: Uuid,
    pub quantity: Decimal,
}

/// Orders `lots` per the selection and walks them until `quantity` is
/// covered. `lots` must be the open lots of a single (portfolio, symbol).
///
/// The returned takes sum exactly to `quantity`. Nothing is mutated.
pub fn plan_disposal(
    symbol: &str,
    lots: &[TaxLot],
    quantity: &Decimal,
    selection: &LotSelection,
) -> Result<Vec<LotTake>, AppError> {
    let ordered = order_lots(lots, selection)?;

    let available: Decimal = ordered.iter().map(|lot| &lot.quantity).sum();
    if &available < quantity {
        return Err(AppError::InsufficientShares {
            symbol: symbol.to_string(),
            requested: quantity.clone(),
            available,
        });
    }

    let mut remaining = quantity.clone();
    let mut plan = Vec::new();
    for lot in ordered {
        if !remaining.is_positive() {
            break;
        }
        let take = remaining.clone().min(lot.quantity.clone());
        remaining -= &take;
        plan.push(LotTake {
            lot_id: lot.id,
            quantity: take,
        });
    }
    Ok(plan)
}

fn order_lots<'a>(
    lots: &'a [TaxLot],
    selection: &LotSelection,
) -> Result<Vec<&'a TaxLot>, AppError> {
    let mut open: Vec<&TaxLot> = lots.iter().filter(|lot| lot.is_open()).collect();
    match selection {
        LotSelection::Fifo => {
            open.sort_by(|a, b| {
                a.purchase_date
                    .cmp(&b.purchase_date)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(open)
        }
        LotSelection::Lifo => {
            open.sort_by(|a, b| {
                b.purchase_date
                    .cmp(&a.purchase_date)
                    .then_with(|| b.id.cmp(&a.id))
            });
            Ok(open)
        }
        LotSelection::SpecificLot(ids) => {
            let mut seen = HashSet::new();
            ids.iter()
                .map(|id| {
                    if !seen.insert(*id) {
                        return Err(AppError::InvalidLotSelection(format!(
                            "lot {} is listed more than once",
                            id
                        )));
                    }
                    open.iter().copied().find(|lot| lot.id == *id).ok_or_else(|| {
                        AppError::InvalidLotSelection(format!(
                            "lot {} is not an open lot of this holding",
                            id
                        ))
                    })
                })
                .collect()
        }
    }
}
