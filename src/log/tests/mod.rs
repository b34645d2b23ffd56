mod tests_tables;
