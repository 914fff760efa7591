pub mod clahe;
pub mod convert_color;
pub mod enhance;
pub mod mask;
mod trim_transparent_border;

pub use trim_transparent_border::{trim_transparent_border, TrimTransparentBorder};

use num_traits::{Bounded, NumCast};
use std::any::TypeId;

pub fn is_floating_point<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<f32>()
}

pub fn get_max_value<T: Bounded + NumCast + 'static>() -> T {
    if is_floating_point::<T>() {
        T::from(1.0).unwrap()
    } else {
        T::max_value()
    }
}
