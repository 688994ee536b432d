mod broadcast_cycle;
mod commands;
mod health_check;
