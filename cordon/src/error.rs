/*
   cordon, a disjunction-partitioned cycle-tracking garbage collector.
   Copyright (C) 2026 cordon contributors.

   This program is free software: you can redistribute it and/or modify
   it under the terms of the GNU General Public License as published by
   the Free Software Foundation, either version 3 of the License, or
   (at your option) any later version.

   This program is distributed in the hope that it will be useful,
   but WITHOUT ANY WARRANTY; without even the implied warranty of
   MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
   GNU General Public License for more details.

   You should have received a copy of the GNU General Public License
   along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! Error types reported by the collection engine.

use thiserror::Error;

/// An attempt was made to aim an arc slot at a record belonging to a
/// different disjunction than the slot itself.
///
/// Disjunctions are closed sub-universes by construction: an object may
/// only ever point at objects registered in the same disjunction. This
/// error is reported synchronously from the offending mutator operation,
/// and the module's state is left unchanged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("attempted to aim a managed pointer at a value from a different disjunction")]
pub struct DisjunctionViolation;
