//! Named settings properties.
//!
//! This is the explicit surface through which marker settings are edited by name, for instance
//! from command line overrides.

use crate::settings::MarkerPositionBehavior;
use anyhow::{anyhow, Result};
use std::ops::{Deref, DerefMut};

/// Object with custom properties.
pub trait Properties {
    /// Get available properties.
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![]
    }

    fn props(&mut self) -> Vec<(&str, Property)> {
        self.props_mut()
            .into_iter()
            .map(|(n, p)| (n, p.into()))
            .collect()
    }

    /// Parse and assign a property by its name.
    ///
    /// The value gets clamped to the property's bounds.
    ///
    /// # Arguments
    ///
    /// * `name` - property name, as listed by `props_mut`. Case insensitive.
    /// * `value` - textual representation of the new value.
    fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        let mut props = self.props_mut();

        let (_, prop) = props
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| anyhow!("Unknown property: {name}"))?;

        prop.parse_set(value)
    }
}

/// Property with a lower and upper bound.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct BoundedProp<T> {
    pub val: T,
    pub min: T,
    pub max: T,
}

impl<T> Deref for BoundedProp<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.val
    }
}

impl<T> DerefMut for BoundedProp<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.val
    }
}

impl<'a, T: Copy> From<BoundedPropMut<'a, T>> for BoundedProp<T> {
    fn from(BoundedPropMut { val, min, max }: BoundedPropMut<'a, T>) -> Self {
        Self {
            val: *val,
            min,
            max,
        }
    }
}

/// Describes the type of a property.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum Property {
    Behavior(MarkerPositionBehavior),
    Float(BoundedProp<f64>),
    Usize(BoundedProp<usize>),
}

impl<'a> From<PropertyMut<'a>> for Property {
    fn from(prop: PropertyMut<'a>) -> Self {
        match prop {
            PropertyMut::Behavior(b) => Self::Behavior(*b),
            PropertyMut::Float(p) => Self::Float(p.into()),
            PropertyMut::Usize(p) => Self::Usize(p.into()),
        }
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Behavior(b) => write!(f, "{b}"),
            Self::Float(p) => write!(f, "{} [{}; {}]", p.val, p.min, p.max),
            Self::Usize(p) => write!(f, "{} [{}; {}]", p.val, p.min, p.max),
        }
    }
}

/// Property with a lower and upper bound.
pub struct BoundedPropMut<'a, T> {
    pub val: &'a mut T,
    pub min: T,
    pub max: T,
}

impl<'a, T> Deref for BoundedPropMut<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.val
    }
}

impl<'a, T> DerefMut for BoundedPropMut<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.val
    }
}

impl<'a, T: PartialOrd + Copy> BoundedPropMut<'a, T> {
    /// Clamp the underlying value between the lower and upper bounds.
    ///
    /// Values that do not compare (NaN) are reset to the lower bound.
    pub fn clamp(&mut self) {
        if !(*self.val >= self.min) {
            *self.val = self.min;
        } else if *self.val > self.max {
            *self.val = self.max;
        }
    }
}

/// Describes the type of a property.
pub enum PropertyMut<'a> {
    Behavior(&'a mut MarkerPositionBehavior),
    Float(BoundedPropMut<'a, f64>),
    Usize(BoundedPropMut<'a, usize>),
}

impl<'a> PropertyMut<'a> {
    /// Create a marker behavior property.
    pub fn behavior(b: &'a mut MarkerPositionBehavior) -> Self {
        Self::Behavior(b)
    }

    /// Create a floating point property.
    ///
    /// # Arguments
    ///
    /// * `val` - reference to the underlying float to be mutated.
    /// * `min` - lowest value for the property.
    /// * `max` - highest value for the property.
    pub fn float(val: &'a mut f64, min: f64, max: f64) -> Self {
        Self::Float(BoundedPropMut { val, min, max })
    }

    /// Create an integer property.
    ///
    /// # Arguments
    ///
    /// * `val` - reference to the underlying usize to be mutated.
    /// * `min` - lowest value for the property.
    /// * `max` - highest value for the property.
    pub fn usize(val: &'a mut usize, min: usize, max: usize) -> Self {
        Self::Usize(BoundedPropMut { val, min, max })
    }

    /// Clamp bounded properties to their range.
    pub fn clamp(&mut self) {
        match self {
            Self::Behavior(_) => {}
            Self::Float(p) => p.clamp(),
            Self::Usize(p) => p.clamp(),
        }
    }

    /// Assign a value of matching type, clamped to bounds.
    ///
    /// Mismatching types are ignored.
    pub fn set(&mut self, other: &Property) {
        match (&mut *self, other) {
            (Self::Behavior(b), Property::Behavior(ob)) => **b = *ob,
            (Self::Float(val), Property::Float(oval)) => *val.val = oval.val,
            (Self::Usize(val), Property::Usize(oval)) => *val.val = oval.val,
            _ => {}
        }
        self.clamp();
    }

    /// Parse a textual value and assign it, clamped to bounds.
    pub fn parse_set(&mut self, value: &str) -> Result<()> {
        let value = value.trim();

        match self {
            Self::Behavior(b) => **b = value.parse()?,
            Self::Float(p) => *p.val = value.parse()?,
            Self::Usize(p) => *p.val = value.parse()?,
        }

        self.clamp();

        Ok(())
    }
}
