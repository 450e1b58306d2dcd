//! Bind values to wire parameters.
//!
//! Without a declared atom type, a value's wire type comes from two ordered tables:
//! [`EXACT_TYPES`] is searched first for the value's own kind, then
//! [`ASSIGNABLE_TYPES`] is scanned for the first predicate the value satisfies.
//! Declaration order is part of the contract: when several entries could match,
//! the earlier one wins.

use crate::conversion::{ConversionContext, convert, natural_kind};
use crate::error::{DriverError, Result};
use crate::transport::{Placeholder, WireParameter};
use crate::types::{AtomType, HostValue, TargetKind, WireValue};

/// Host kinds with a wire type of their own.
pub const EXACT_TYPES: &[(TargetKind, AtomType)] = &[
    (TargetKind::String, AtomType::Character),
    (TargetKind::Boolean, AtomType::Boolean),
    (TargetKind::Int, AtomType::Int4),
    (TargetKind::Long, AtomType::Int8),
    (TargetKind::Float, AtomType::Float4),
    (TargetKind::Double, AtomType::Float8),
    (TargetKind::Decimal, AtomType::Decimal),
    (TargetKind::Bytes, AtomType::Octet),
    (TargetKind::LocalDate, AtomType::Date),
    (TargetKind::Date, AtomType::Date),
    (TargetKind::LocalTime, AtomType::TimeOfDay),
    (TargetKind::Time, AtomType::TimeOfDay),
    (TargetKind::LocalDateTime, AtomType::TimePoint),
    (TargetKind::Timestamp, AtomType::TimePoint),
    (TargetKind::OffsetTime, AtomType::TimeOfDayWithTimeZone),
    (TargetKind::OffsetDateTime, AtomType::TimePointWithTimeZone),
    (TargetKind::ZonedDateTime, AtomType::TimePointWithTimeZone),
];

type Assignable = fn(&HostValue) -> bool;

/// Fallback matches for kinds without an exact entry, in priority order.
pub const ASSIGNABLE_TYPES: &[(Assignable, AtomType)] = &[
    (is_small_integer, AtomType::Int4),
    (is_byte_source, AtomType::Octet),
    (is_character_source, AtomType::Character),
];

fn is_small_integer(value: &HostValue) -> bool {
    matches!(value, HostValue::Byte(_) | HostValue::Short(_))
}

fn is_byte_source(value: &HostValue) -> bool {
    matches!(value, HostValue::ByteStream(_) | HostValue::Blob(_))
}

fn is_character_source(value: &HostValue) -> bool {
    matches!(value, HostValue::CharacterStream(_) | HostValue::Clob(_))
}

/// Wire type a bind value encodes as when none is declared. `None` for null.
#[must_use]
pub fn infer_atom_type(value: &HostValue) -> Option<AtomType> {
    let kind = value.kind()?;
    EXACT_TYPES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, atom)| *atom)
        .or_else(|| {
            ASSIGNABLE_TYPES
                .iter()
                .find(|(matches, _)| matches(value))
                .map(|(_, atom)| *atom)
        })
}

/// First host kind in [`EXACT_TYPES`] declaring `atom`.
#[must_use]
pub fn natural_target_for(atom: AtomType) -> Option<TargetKind> {
    EXACT_TYPES
        .iter()
        .find(|(_, a)| *a == atom)
        .map(|(kind, _)| *kind)
}

/// Wire value carrying the host value as-is, before any declared-type conversion.
fn natural_wire(value: &HostValue) -> WireValue {
    match value {
        HostValue::Null => WireValue::Null,
        HostValue::String(s) | HostValue::Clob(s) => WireValue::Character(s.clone()),
        HostValue::Boolean(b) => WireValue::Boolean(*b),
        HostValue::Byte(v) => WireValue::Int4(i32::from(*v)),
        HostValue::Short(v) => WireValue::Int4(i32::from(*v)),
        HostValue::Int(v) => WireValue::Int4(*v),
        HostValue::Long(v) => WireValue::Int8(*v),
        HostValue::Float(v) => WireValue::Float4(*v),
        HostValue::Double(v) => WireValue::Float8(*v),
        HostValue::Decimal(d) => WireValue::Decimal(*d),
        HostValue::Bytes(b) | HostValue::Blob(b) => WireValue::Octet(b.clone()),
        HostValue::Date(d) | HostValue::LocalDate(d) => WireValue::Date(*d),
        HostValue::Time(t) | HostValue::LocalTime(t) => WireValue::TimeOfDay(*t),
        HostValue::Timestamp(dt) | HostValue::LocalDateTime(dt) => WireValue::TimePoint(*dt),
        HostValue::OffsetTime(t) => WireValue::TimeOfDayWithTimeZone(*t),
        HostValue::OffsetDateTime(dt) | HostValue::ZonedDateTime(dt) => {
            WireValue::TimePointWithTimeZone(*dt)
        }
        HostValue::ByteStream(cursor) => WireValue::Octet(cursor.get_ref().clone()),
        HostValue::CharacterStream(cursor) => WireValue::Character(cursor.get_ref().clone()),
    }
}

/// Turns bind values into wire parameters.
#[derive(Debug, Clone, Default)]
pub struct ParameterEncoder {
    ctx: ConversionContext,
}

impl ParameterEncoder {
    #[must_use]
    pub fn new(ctx: ConversionContext) -> Self {
        Self { ctx }
    }

    /// Encode one parameter.
    ///
    /// # Errors
    /// Returns `DriverError::Parameter` for an untyped null or a large-object atom type, or a
    /// conversion error when the value cannot be represented as `declared`.
    pub fn encode(
        &self,
        name: &str,
        value: &HostValue,
        declared: Option<AtomType>,
    ) -> Result<WireParameter> {
        let atom = declared.or_else(|| infer_atom_type(value)).ok_or_else(|| {
            DriverError::Parameter(format!("cannot infer a wire type for null parameter {name}"))
        })?;
        if matches!(atom, AtomType::Blob | AtomType::Clob) {
            return Err(DriverError::Parameter(format!(
                "parameter {name}: {atom} cannot be bound directly; bind octet or character data"
            )));
        }
        if value.is_null() {
            return Ok(WireParameter::null(name, atom));
        }

        let wire = natural_wire(value);
        let wire = if wire.atom_type() == Some(atom) {
            wire
        } else {
            let host = convert(&wire, natural_kind(atom), &self.ctx)?;
            natural_wire(&host)
        };
        Ok(WireParameter {
            name: name.to_string(),
            atom_type: atom,
            value: wire,
        })
    }
}

#[derive(Debug, Clone)]
struct Slot {
    atom_type: AtomType,
    value: Option<HostValue>,
}

/// Positional bind state of one prepared statement.
///
/// A position's atom type survives `clear` and null rebinds; binding a value whose
/// type differs replaces it and flags the placeholders as changed, so the statement
/// is prepared again before its next execution.
#[derive(Debug, Clone, Default)]
pub struct ParameterBindings {
    slots: Vec<Option<Slot>>,
    changed: bool,
}

impl ParameterBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` at 1-based `index`.
    ///
    /// # Errors
    /// Returns `DriverError::Parameter` for index 0 or a null without a known type.
    pub fn bind(&mut self, index: usize, value: HostValue, declared: Option<AtomType>) -> Result<()> {
        let position = index
            .checked_sub(1)
            .ok_or_else(|| DriverError::Parameter("parameter indexes start at 1".into()))?;
        if self.slots.len() <= position {
            self.slots.resize(position + 1, None);
        }
        let established = self.slots[position].as_ref().map(|slot| slot.atom_type);
        let atom = if value.is_null() {
            declared.or(established)
        } else {
            declared.or_else(|| infer_atom_type(&value))
        }
        .ok_or_else(|| {
            DriverError::Parameter(format!("parameter {index}: null needs a declared type"))
        })?;

        match established {
            Some(previous) if previous != atom => {
                tracing::debug!(index, %previous, %atom, "placeholder type changed");
                self.changed = true;
            }
            None => self.changed = true,
            _ => {}
        }
        self.slots[position] = Some(Slot {
            atom_type: atom,
            value: Some(value),
        });
        Ok(())
    }

    /// Drop bound values, keeping each position's type.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.value = None;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True once after any placeholder was added or retyped.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Placeholder declarations for preparing the statement.
    ///
    /// # Errors
    /// Returns `DriverError::Parameter` if a position below the highest bound one was never bound.
    pub fn placeholders(&self) -> Result<Vec<Placeholder>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.as_ref()
                    .map(|slot| Placeholder {
                        name: placeholder_name(i + 1),
                        atom_type: slot.atom_type,
                    })
                    .ok_or_else(|| DriverError::Parameter(format!("parameter {} is not set", i + 1)))
            })
            .collect()
    }

    /// Encode every bound value.
    ///
    /// # Errors
    /// Returns `DriverError::Parameter` for unset positions, or the encoder's error.
    pub fn encode(&self, encoder: &ParameterEncoder) -> Result<Vec<WireParameter>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let index = i + 1;
                let slot = slot.as_ref().ok_or_else(|| {
                    DriverError::Parameter(format!("parameter {index} is not set"))
                })?;
                let value = slot.value.as_ref().ok_or_else(|| {
                    DriverError::Parameter(format!("parameter {index} is not set"))
                })?;
                encoder.encode(&placeholder_name(index), value, Some(slot.atom_type))
            })
            .collect()
    }
}

#[must_use]
pub fn placeholder_name(index: usize) -> String {
    format!("p{index}")
}
