//! Circuit grid

use crate::error::GridError;
use crate::violation::Violation;
use pnl_model::{
    validate_pole_count, Circuit, CircuitAttr, CircuitCount, FieldKey, LoadType, PhaseColumn,
    PolePosition, TemplateDescriptor, MAX_POLES,
};
use pnl_resolver::ParameterStore;
use std::collections::BTreeMap;
use tracing::debug;

/// Breaker-level fields, stored on the first row of a group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupFields {
    /// Load description
    pub description: Option<String>,
    /// Breaker trip rating
    pub breaker_amps: Option<f64>,
}

impl GroupFields {
    /// No fields
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// With a trip rating
    #[inline]
    #[must_use]
    pub fn with_breaker_amps(mut self, amps: f64) -> Self {
        self.breaker_amps = Some(amps);
        self
    }
}

/// Placed breaker
#[derive(Debug, Clone, PartialEq)]
pub struct PoleGroup {
    /// First row
    pub start: u8,
    /// Rows spanned
    pub pole_count: u8,
    /// Breaker-level fields
    pub fields: GroupFields,
}

impl PoleGroup {
    /// Last row spanned
    #[inline]
    #[must_use]
    pub fn last_row(&self) -> u8 {
        self.start + (self.pole_count - 1)
    }

    /// Whether the group spans `row`
    #[inline]
    #[must_use]
    pub fn contains(&self, row: u8) -> bool {
        (self.start..=self.last_row()).contains(&row)
    }
}

/// Load fields of one row
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RowLoad {
    /// Load on the row's phase
    pub load_amps: Option<f64>,
    /// Classification
    pub load_type: Option<LoadType>,
}

impl RowLoad {
    /// Whether nothing is recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.load_amps.is_none() && self.load_type.is_none()
    }
}

#[derive(Default)]
struct RowFields {
    description: Option<String>,
    poles: Option<u8>,
    breaker_amps: Option<f64>,
    load: RowLoad,
}

impl RowFields {
    fn head_attrs(&self) -> Vec<CircuitAttr> {
        let mut attrs = Vec::new();
        if self.description.is_some() {
            attrs.push(CircuitAttr::Description);
        }
        if self.poles.is_some() {
            attrs.push(CircuitAttr::BreakerPoles);
        }
        if self.breaker_amps.is_some() {
            attrs.push(CircuitAttr::BreakerAmps);
        }
        attrs
    }
}

/// Row layout of one panel
///
/// Rows not claimed by an explicit group behave as single-pole spares.
#[derive(Debug, Clone)]
pub struct CircuitGrid {
    number_of_circuits: CircuitCount,
    template: TemplateDescriptor,
    groups: BTreeMap<u8, PoleGroup>,
    loads: BTreeMap<u8, RowLoad>,
    recorded: Vec<Violation>,
}

impl CircuitGrid {
    /// Empty grid
    #[must_use]
    pub fn new(number_of_circuits: CircuitCount, template: TemplateDescriptor) -> Self {
        Self {
            number_of_circuits,
            template,
            groups: BTreeMap::new(),
            loads: BTreeMap::new(),
            recorded: Vec::new(),
        }
    }

    /// Rows in the panel
    #[inline]
    #[must_use]
    pub fn number_of_circuits(&self) -> u8 {
        self.number_of_circuits.get()
    }

    /// Template driving column assignment
    #[inline]
    #[must_use]
    pub fn template(&self) -> &TemplateDescriptor {
        &self.template
    }

    /// Claim `pole_count` rows starting at `start` for one breaker
    ///
    /// # Errors
    /// - [`GridError::InvalidPoleCount`] unless `1 <= pole_count <= 3`
    /// - [`GridError::InvalidPoleSpan`] if the group runs past the last row
    /// - [`GridError::Overlap`] if any row already belongs to a group
    pub fn place_group(
        &mut self,
        start: u8,
        pole_count: u8,
        fields: GroupFields,
    ) -> Result<(), GridError> {
        if pole_count == 0 || pole_count > MAX_POLES {
            return Err(GridError::InvalidPoleCount(pole_count));
        }
        let n = self.number_of_circuits();
        if start == 0 || u16::from(start) + u16::from(pole_count) - 1 > u16::from(n) {
            return Err(GridError::InvalidPoleSpan {
                start,
                pole_count,
                number_of_circuits: n,
            });
        }
        let last = start + (pole_count - 1);
        if let Some(existing) = self
            .groups
            .values()
            .find(|g| g.start <= last && start <= g.last_row())
        {
            return Err(GridError::Overlap {
                start,
                existing_start: existing.start,
            });
        }

        self.groups.insert(
            start,
            PoleGroup {
                start,
                pole_count,
                fields,
            },
        );
        Ok(())
    }

    /// Group spanning `row`, if any
    #[must_use]
    pub fn group_at(&self, row: u8) -> Option<&PoleGroup> {
        self.groups
            .range(..=row)
            .next_back()
            .map(|(_, g)| g)
            .filter(|g| g.contains(row))
    }

    /// Explicit groups in row order
    pub fn groups(&self) -> impl Iterator<Item = &PoleGroup> {
        self.groups.values()
    }

    /// Record the load fields of one row
    pub fn set_load(&mut self, row: u8, load: RowLoad) -> Result<(), GridError> {
        let n = self.number_of_circuits();
        if row == 0 || row > n {
            return Err(GridError::RowOutOfRange {
                circuit: row,
                number_of_circuits: n,
            });
        }
        if load.is_empty() {
            self.loads.remove(&row);
        } else {
            self.loads.insert(row, load);
        }
        Ok(())
    }

    /// Load fields of one row
    #[must_use]
    pub fn load(&self, row: u8) -> RowLoad {
        self.loads.get(&row).copied().unwrap_or_default()
    }

    /// Derive the grid from a session's accepted circuit fields
    ///
    /// Inconsistent data does not fail the build; it is kept as violations
    /// for [`Self::validate`]. Fails only when `number_of_circuits` is absent.
    pub fn from_store(
        store: &ParameterStore,
        template: &TemplateDescriptor,
    ) -> Result<Self, GridError> {
        let n = store
            .number_of_circuits()
            .ok_or(GridError::MissingCircuitCount)?;
        let count = template.circuit_count(i64::from(n))?;
        let mut grid = Self::new(count, template.clone());

        let mut rows: BTreeMap<u8, RowFields> = BTreeMap::new();
        for record in store.circuit_records() {
            let FieldKey::Circuit { circuit, attr } = record.field_key else {
                continue;
            };
            let entry = rows.entry(circuit).or_default();
            let value = &record.current_value;
            match attr {
                CircuitAttr::Description => entry.description = value.as_text().map(str::to_string),
                CircuitAttr::BreakerPoles => entry.poles = validate_pole_count(value).ok(),
                CircuitAttr::BreakerAmps => entry.breaker_amps = value.as_number(),
                CircuitAttr::LoadAmps => entry.load.load_amps = value.as_number(),
                CircuitAttr::LoadType => {
                    entry.load.load_type = value.as_text().and_then(|t| t.parse().ok());
                }
            }
        }

        for (&row, fields) in &rows {
            if row > n {
                grid.recorded.push(Violation::CircuitOutOfRange {
                    circuit: row,
                    number_of_circuits: n,
                });
                continue;
            }

            let head = fields.head_attrs();
            if !head.is_empty() {
                grid.place_head(row, fields, &head)?;
            }
            if !fields.load.is_empty() {
                grid.loads.insert(row, fields.load);
            }
        }

        debug!(
            number_of_circuits = n,
            groups = grid.groups.len(),
            recorded = grid.recorded.len(),
            "grid derived from store"
        );
        Ok(grid)
    }

    fn place_head(
        &mut self,
        row: u8,
        fields: &RowFields,
        head: &[CircuitAttr],
    ) -> Result<(), GridError> {
        if let Some(group_start) = self.group_at(row).map(|g| g.start) {
            for &attr in head {
                self.recorded.push(Violation::HeadFieldOnContinuation {
                    circuit: row,
                    attr,
                    group_start,
                });
            }
            return Ok(());
        }

        let declared = fields.poles.unwrap_or(1);
        let group_fields = GroupFields {
            description: fields.description.clone(),
            breaker_amps: fields.breaker_amps,
        };
        match self.place_group(row, declared, group_fields.clone()) {
            Err(GridError::InvalidPoleSpan { .. }) => {
                self.recorded.push(Violation::PoleCountMismatch {
                    circuit: row,
                    declared,
                    occupied: self.number_of_circuits() - row + 1,
                });
                self.place_group(row, 1, group_fields)
            }
            other => other,
        }
    }

    /// Build from an externally supplied circuit list
    ///
    /// Circuits that cannot be placed are skipped and reported.
    #[must_use]
    pub fn from_circuits(
        number_of_circuits: CircuitCount,
        template: &TemplateDescriptor,
        circuits: &[Circuit],
    ) -> Self {
        let mut grid = Self::new(number_of_circuits, template.clone());
        let n = number_of_circuits.get();

        for circuit in circuits {
            let start = circuit.circuit_number;
            if start == 0 || start > n {
                grid.recorded.push(Violation::CircuitOutOfRange {
                    circuit: start,
                    number_of_circuits: n,
                });
                continue;
            }
            let fields = GroupFields {
                description: circuit.description.clone(),
                breaker_amps: circuit.breaker_amps,
            };
            match grid.place_group(start, circuit.pole_count, fields) {
                Ok(()) => {}
                Err(GridError::Overlap { .. }) => {
                    grid.recorded.push(Violation::DuplicateCircuit { circuit: start });
                    continue;
                }
                Err(_) => {
                    grid.recorded.push(Violation::PoleCountMismatch {
                        circuit: start,
                        declared: circuit.pole_count,
                        occupied: n - start + 1,
                    });
                    continue;
                }
            }

            if circuit.poles.len() != usize::from(circuit.pole_count) {
                grid.recorded.push(Violation::PoleCountMismatch {
                    circuit: start,
                    declared: circuit.pole_count,
                    occupied: u8::try_from(circuit.poles.len()).unwrap_or(u8::MAX),
                });
            }
            for pole in &circuit.poles {
                if !circuit.rows().contains(&pole.circuit_number) {
                    continue;
                }
                let load = RowLoad {
                    load_amps: pole.load_amps,
                    load_type: pole.load_type.is_assigned().then_some(pole.load_type),
                };
                if !load.is_empty() {
                    grid.loads.insert(pole.circuit_number, load);
                }
            }
        }
        grid
    }

    fn is_occupied(&self, row: u8) -> bool {
        self.group_at(row).is_some() || self.loads.contains_key(&row)
    }

    /// Structural violations, ordered by row
    #[must_use]
    pub fn validate(&self) -> Vec<Violation> {
        let mut out = self.recorded.clone();

        for (&row, load) in &self.loads {
            match (load.load_amps, load.load_type) {
                (Some(_), None) => out.push(Violation::MissingLoadType { circuit: row }),
                (None, Some(_)) => out.push(Violation::LoadTypeWithoutLoad { circuit: row }),
                _ => {}
            }
        }

        if !self.template.mandatory_row_fields.is_empty() {
            for row in 1..=self.number_of_circuits() {
                if !self.is_occupied(row) {
                    continue;
                }
                for &attr in &self.template.mandatory_row_fields {
                    if !self.row_has(row, attr) {
                        out.push(Violation::UnfilledRow { circuit: row, attr });
                    }
                }
            }
        }

        out.sort_by_key(Violation::circuit);
        out
    }

    fn row_has(&self, row: u8, attr: CircuitAttr) -> bool {
        if attr.is_group_head() {
            return match self.group_at(row) {
                Some(g) if g.start != row => true,
                Some(g) => match attr {
                    CircuitAttr::Description => g.fields.description.is_some(),
                    CircuitAttr::BreakerAmps => g.fields.breaker_amps.is_some(),
                    _ => true,
                },
                None => false,
            };
        }
        let load = self.load(row);
        match attr {
            CircuitAttr::LoadAmps => load.load_amps.is_some(),
            CircuitAttr::LoadType => load.load_type.is_some(),
            _ => true,
        }
    }

    /// Whether [`Self::validate`] is empty
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    fn pole(&self, row: u8, phase_column: PhaseColumn) -> PolePosition {
        let load = self.load(row);
        let load_type = match (load.load_amps, load.load_type) {
            (Some(_), Some(t)) => t,
            _ => LoadType::NotApplicable,
        };
        PolePosition {
            circuit_number: row,
            phase_column,
            load_amps: load.load_amps,
            load_type,
        }
    }

    /// Every row as circuits: explicit groups plus single-pole spares
    #[must_use]
    pub fn circuits(&self) -> Vec<Circuit> {
        let n = u16::from(self.number_of_circuits());
        let mut out = Vec::new();
        let mut row: u16 = 1;
        while row <= n {
            // row <= n <= u8::MAX
            let r = u8::try_from(row).unwrap_or(u8::MAX);
            if let Some(group) = self.groups.get(&r) {
                out.push(Circuit {
                    circuit_number: r,
                    pole_count: group.pole_count,
                    description: group.fields.description.clone(),
                    breaker_amps: group.fields.breaker_amps,
                    poles: (r..=group.last_row())
                        .zip(self.template.group_phase_columns(r, group.pole_count))
                        .map(|(p, column)| self.pole(p, column))
                        .collect(),
                });
                row += u16::from(group.pole_count);
            } else {
                out.push(Circuit {
                    circuit_number: r,
                    pole_count: 1,
                    description: None,
                    breaker_amps: None,
                    poles: vec![self.pole(r, self.template.phase_column_for(r))],
                });
                row += 1;
            }
        }
        out
    }
}
