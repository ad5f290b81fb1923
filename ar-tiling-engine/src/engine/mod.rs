pub mod assets;
pub mod core;
pub mod loading;
pub mod material;
pub mod scene;
pub mod selection;
pub mod xr;
