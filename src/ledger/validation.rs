use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::decimal::Decimal;
use crate::errors::AppError;
use crate::ledger::cost_basis::LotSelection;
use crate::models::{
    transaction_amount, CorporateActionType, CreateCorporateAction, CreateTransaction, Portfolio,
    TransactionType,
};

pub const MAX_SYMBOL_LEN: usize = 20;
pub const MAX_NOTES_LEN: usize = 1000;

static SYMBOL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// Uppercases and checks a ticker: starts with a letter or digit, then
/// letters, digits, `.` and `-` (`BRK.B`, `RDS-A`).
pub fn normalize_symbol(raw: &str) -> Result<String, String> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err("must not be empty".to_string());
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(format!("must be at most {} characters", MAX_SYMBOL_LEN));
    }
    let valid = SYMBOL_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Z0-9][A-Z0-9.\-]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(&symbol));
    if !valid {
        return Err("may only contain letters, digits, '.' and '-'".to_string());
    }
    Ok(symbol)
}

/// Three-letter ISO-style currency code, uppercased.
pub fn normalize_currency(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    (code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())).then_some(code)
}

/// A user-submitted transaction that passed every pre-commit check.
#[derive(Debug, Clone)]
pub struct ValidatedTransaction {
    pub transaction_type: TransactionType,
    pub symbol: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub commission: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    /// Present for SELL only.
    pub selection: Option<LotSelection>,
}

impl ValidatedTransaction {
    pub fn amount(&self) -> Option<Decimal> {
        transaction_amount(
            self.transaction_type,
            &self.quantity,
            self.price.as_ref(),
            &self.commission,
        )
    }

    /// `quantity × price + commission`, the cost carried by a new lot.
    pub fn acquisition_cost(&self) -> Decimal {
        match &self.price {
            Some(price) => price * &self.quantity + &self.commission,
            None => self.commission.clone(),
        }
    }
}

/// Pure pre-commit validation against the owning portfolio's settings.
pub fn validate_transaction(
    input: CreateTransaction,
    portfolio: &Portfolio,
) -> Result<ValidatedTransaction, AppError> {
    let transaction_type = input.transaction_type;
    if transaction_type.is_corporate_action() {
        return Err(AppError::transaction_field(
            "transaction_type",
            "corporate-action transactions are recorded through proposals",
        ));
    }

    let symbol =
        normalize_symbol(&input.symbol).map_err(|m| AppError::transaction_field("symbol", m))?;

    if !input.quantity.is_positive() {
        return Err(AppError::transaction_field("quantity", "must be positive"));
    }
    if !input.quantity.fits_storage() {
        return Err(AppError::transaction_field("quantity", "is too large"));
    }

    let price = match (transaction_type.requires_price(), input.price) {
        (_, Some(price)) if !price.is_positive() => {
            return Err(AppError::transaction_field("price", "must be positive"));
        }
        (_, Some(price)) if !price.fits_storage() => {
            return Err(AppError::transaction_field("price", "is too large"));
        }
        (true, None) => {
            return Err(AppError::transaction_field(
                "price",
                "is required for this transaction type",
            ));
        }
        (_, price) => price,
    };

    let commission = input.commission.unwrap_or_else(Decimal::zero);
    if commission.is_negative() {
        return Err(AppError::transaction_field("commission", "must not be negative"));
    }

    let currency = match input.currency.as_deref() {
        Some(raw) => normalize_currency(raw).ok_or_else(|| {
            AppError::transaction_field("currency", "must be a 3-letter currency code")
        })?,
        None => portfolio.base_currency.clone(),
    };

    let notes = input.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
        return Err(AppError::transaction_field("notes", "is too long"));
    }

    let selection = if transaction_type == TransactionType::Sell {
        Some(LotSelection::for_method(portfolio.cost_basis_method, input.lot_ids)?)
    } else if input.lot_ids.is_some() {
        return Err(AppError::transaction_field(
            "lot_ids",
            "lot selection only applies to SELL transactions",
        ));
    } else {
        None
    };

    let validated = ValidatedTransaction {
        transaction_type,
        symbol,
        date: input.date,
        quantity: input.quantity,
        price,
        commission,
        currency,
        notes,
        selection,
    };
    if validated.amount().is_some_and(|a| !a.fits_storage()) {
        return Err(AppError::transaction_field("quantity", "amount is too large"));
    }
    Ok(validated)
}

/// Validates an incoming corporate action by type and drops the fields that
/// do not apply to it.
pub fn validate_corporate_action(
    input: CreateCorporateAction,
) -> Result<CreateCorporateAction, AppError> {
    let symbol =
        normalize_symbol(&input.symbol).map_err(|m| AppError::action_field("symbol", m))?;

    let require_positive = |value: Option<Decimal>, field: &'static str| match value {
        Some(v) if v.is_positive() && v.fits_storage() => Ok(Some(v)),
        _ => Err(AppError::action_field(field, "must be a positive number")),
    };
    let require_new_symbol = |value: Option<String>| -> Result<Option<String>, AppError> {
        let raw = value.ok_or_else(|| AppError::action_field("new_symbol", "is required"))?;
        let new_symbol =
            normalize_symbol(&raw).map_err(|m| AppError::action_field("new_symbol", m))?;
        if new_symbol == symbol {
            return Err(AppError::action_field(
                "new_symbol",
                "must differ from the current symbol",
            ));
        }
        Ok(Some(new_symbol))
    };

    let (ratio, amount, new_symbol) = match input.action_type {
        CorporateActionType::Split => (require_positive(input.ratio, "ratio")?, None, None),
        CorporateActionType::Dividend => (None, require_positive(input.amount, "amount")?, None),
        CorporateActionType::Merger | CorporateActionType::Spinoff => (
            require_positive(input.ratio, "ratio")?,
            None,
            require_new_symbol(input.new_symbol)?,
        ),
        CorporateActionType::TickerChange => (None, None, require_new_symbol(input.new_symbol)?),
    };

    Ok(CreateCorporateAction {
        symbol: symbol.clone(),
        action_type: input.action_type,
        action_date: input.action_date,
        ratio,
        amount,
        new_symbol,
        description: input.description.filter(|d| !d.trim().is_empty()),
    })
}
