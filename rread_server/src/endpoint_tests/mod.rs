mod helpers;
mod mocks;

mod dead_letters;
mod webhook;
