//! Loan, savings and inflation calculators. Rates are annual percentages;
//! all money figures in the results are rounded to cents.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_MONTHS: u32 = 600;
pub const MAX_YEARS: u32 = 100;

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("{0}")]
    Invalid(String),
}

fn invalid(message: &str) -> SimulationError {
    SimulationError::Invalid(message.to_string())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn check_months(months: u32) -> Result<(), SimulationError> {
    if !(1..=MAX_MONTHS).contains(&months) {
        return Err(SimulationError::Invalid(format!(
            "months must be between 1 and {MAX_MONTHS}"
        )));
    }
    Ok(())
}

fn check_rate(rate: f64) -> Result<(), SimulationError> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(invalid("rate must be a non-negative number"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmortizationMethod {
    /// Constant instalment.
    #[default]
    French,
    /// Constant principal.
    German,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoanRequest {
    pub principal: f64,
    pub annual_rate: f64,
    pub months: u32,
    #[serde(default)]
    pub method: AmortizationMethod,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoanPayment {
    pub month: u32,
    pub payment: f64,
    pub principal: f64,
    pub interest: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanSchedule {
    pub method: AmortizationMethod,
    pub first_payment: f64,
    pub last_payment: f64,
    pub total_paid: f64,
    pub total_interest: f64,
    pub payments: Vec<LoanPayment>,
}

pub fn simulate_loan(request: &LoanRequest) -> Result<LoanSchedule, SimulationError> {
    if !request.principal.is_finite() || request.principal <= 0.0 {
        return Err(invalid("principal must be greater than zero"));
    }
    check_rate(request.annual_rate)?;
    check_months(request.months)?;

    let rate = request.annual_rate / 100.0 / 12.0;
    let n = request.months;
    let annuity = if rate == 0.0 {
        request.principal / f64::from(n)
    } else {
        request.principal * rate / (1.0 - (1.0 + rate).powi(-(n as i32)))
    };
    let constant_principal = request.principal / f64::from(n);

    let mut balance = request.principal;
    let mut total_paid = 0.0;
    let mut total_interest = 0.0;
    let mut payments = Vec::with_capacity(n as usize);

    for month in 1..=n {
        let interest = balance * rate;
        let mut principal = match request.method {
            AmortizationMethod::French => annuity - interest,
            AmortizationMethod::German => constant_principal,
        };
        if month == n {
            principal = balance;
        }
        let payment = principal + interest;
        balance = (balance - principal).max(0.0);
        total_paid += payment;
        total_interest += interest;

        payments.push(LoanPayment {
            month,
            payment: round2(payment),
            principal: round2(principal),
            interest: round2(interest),
            balance: round2(balance),
        });
    }

    Ok(LoanSchedule {
        method: request.method,
        first_payment: payments.first().map_or(0.0, |p| p.payment),
        last_payment: payments.last().map_or(0.0, |p| p.payment),
        total_paid: round2(total_paid),
        total_interest: round2(total_interest),
        payments,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SavingsRequest {
    #[serde(default)]
    pub initial: f64,
    #[serde(default)]
    pub monthly_deposit: f64,
    pub annual_rate: f64,
    pub months: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SavingsPoint {
    pub month: u32,
    pub balance: f64,
    pub deposited: f64,
    pub interest: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavingsProjection {
    pub final_balance: f64,
    pub total_deposited: f64,
    pub total_interest: f64,
    pub timeline: Vec<SavingsPoint>,
}

/// Monthly compounding; each deposit lands at the end of its month.
pub fn project_savings(request: &SavingsRequest) -> Result<SavingsProjection, SimulationError> {
    if !request.initial.is_finite() || request.initial < 0.0 {
        return Err(invalid("initial amount cannot be negative"));
    }
    if !request.monthly_deposit.is_finite() || request.monthly_deposit < 0.0 {
        return Err(invalid("monthly deposit cannot be negative"));
    }
    check_rate(request.annual_rate)?;
    check_months(request.months)?;

    let rate = request.annual_rate / 100.0 / 12.0;
    let mut balance = request.initial;
    let mut deposited = request.initial;
    let mut interest_total = 0.0;
    let mut timeline = Vec::with_capacity(request.months as usize);

    for month in 1..=request.months {
        let interest = balance * rate;
        interest_total += interest;
        balance += interest + request.monthly_deposit;
        deposited += request.monthly_deposit;
        timeline.push(SavingsPoint {
            month,
            balance: round2(balance),
            deposited: round2(deposited),
            interest: round2(interest_total),
        });
    }

    Ok(SavingsProjection {
        final_balance: round2(balance),
        total_deposited: round2(deposited),
        total_interest: round2(interest_total),
        timeline,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct InflationRequest {
    pub amount: f64,
    pub annual_inflation: f64,
    pub years: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InflationImpact {
    pub amount: f64,
    pub years: u32,
    /// What `amount` will buy after `years`, in today's money.
    pub purchasing_power: f64,
    /// Nominal amount needed after `years` to match today's `amount`.
    pub required_amount: f64,
    pub value_lost_percent: f64,
}

pub fn inflation_impact(request: &InflationRequest) -> Result<InflationImpact, SimulationError> {
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(invalid("amount must be greater than zero"));
    }
    check_rate(request.annual_inflation)?;
    if !(1..=MAX_YEARS).contains(&request.years) {
        return Err(SimulationError::Invalid(format!(
            "years must be between 1 and {MAX_YEARS}"
        )));
    }

    let factor = (1.0 + request.annual_inflation / 100.0).powi(request.years as i32);
    let purchasing_power = request.amount / factor;
    Ok(InflationImpact {
        amount: request.amount,
        years: request.years,
        purchasing_power: round2(purchasing_power),
        required_amount: round2(request.amount * factor),
        value_lost_percent: round2((1.0 - 1.0 / factor) * 100.0),
    })
}
