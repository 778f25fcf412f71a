mod helpers;

mod cli;
mod federation;
mod persistence;
