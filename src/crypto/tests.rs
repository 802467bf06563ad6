mod keys;
mod srp;
