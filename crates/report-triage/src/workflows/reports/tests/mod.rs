mod common;
mod corroboration;
mod routing;
